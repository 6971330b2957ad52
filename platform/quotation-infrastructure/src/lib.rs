pub mod calendar;
pub mod clock;
pub mod instruments;
pub mod market_data;
pub mod market_stream;

mod csv_io;
