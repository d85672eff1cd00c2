pub mod price_series;
