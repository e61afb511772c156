pub mod cache;
pub mod catalog;
pub mod directory;
pub mod fetcher;
pub mod m3u_parser;
pub mod sources;
