//! Deduplication of long-lived text objects during collection pauses.
//!
//! While the runtime has every thread stopped, a [`CollectionPass`] walks
//! every object of the old generation with [`heapscan`], and the
//! [`Deduplicator`] redirects references to text objects whose content it
//! has already seen to the first instance. The duplicates become garbage
//! for the collector to reclaim.
//!
//! [`Profiler`] wires this to host notifications; [`Runtime`] is the set of
//! host services the engine needs.

mod config;
mod dedup;
mod error;
mod pass;
mod profiler;
mod runtime;
pub mod sim;
mod stats;
mod types;

pub use config::{ProfilerCreateInfo, ProfilerSettings, TriggerMode};
pub use dedup::{DedupStats, DedupTable, Deduplicator, djb2};
pub use error::{Error, HostError};
pub use pass::{CollectionPass, PassOutcome, SkipReason};
pub use profiler::{Profiler, SuspendReason};
pub use runtime::{ClassInfo, GenerationRange, Runtime, StringLayout};
pub use stats::PassStats;
pub use types::{TextType, TextTypeCell, TypeFlags, is_text_type_name};
