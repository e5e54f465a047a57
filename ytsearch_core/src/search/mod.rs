pub mod executor;

pub use executor::{
    group_by_shard, order_results, rescore_if_multi_shard, search_shard, validate_order_by,
    validate_query, CaptionTrackMatch, OrderBy, SearchCommand, SearchResultItem,
};
