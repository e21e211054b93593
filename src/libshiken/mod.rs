pub mod db;
pub mod kotoba;
pub mod shitsumon;
pub mod yomikomi;
