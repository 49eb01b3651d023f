pub mod answer;
pub mod deal;
pub mod product;
