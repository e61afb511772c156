pub mod playlist;
pub mod source;

pub use playlist::{BrowseNode, CacheEntry, Channel, MediaClass, PlayMedia, SourceListing};
pub use source::{
    AddCountryRequest, AddCustomRequest, CountriesResponse, Country, Source, SourceKind,
    SourcesResponse, UpdateSourceRequest,
};
