pub mod clock;
pub mod config;
pub mod frontmatter;
pub mod search;
pub mod service;
pub mod store;


pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TagIndexConfig;
pub use frontmatter::types::{Frontmatter, FrontmatterValue, RawFrontmatter, SplitContent};
pub use frontmatter::FrontmatterParser;
pub use search::events::{
    ChannelNotifier, EventNotifier, IndexMeta, NoopNotifier, ReindexEvent, ReindexKind, REINDEX_EVENT,
};
pub use search::fuzzy::{TagCount, TagSearch, TagSearchResult};
pub use search::parser::{extract_tags, tags_with_prefix};
pub use search::persistence::{IndexPersistence, JsonFileStore, KeyValueStore, MemoryStore};
pub use search::watcher::VaultWatcher;
pub use search::{journal_doc_id, parse_journal_doc_id, scan, IndexData, TagIndex};
pub use service::SharedTagIndex;
pub use store::{ContentStore, EntryKind, FsContentStore, MemoryContentStore, StoreEntry, StoreError};
