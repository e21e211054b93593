pub mod libshiken;
