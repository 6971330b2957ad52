pub mod quote_event;
