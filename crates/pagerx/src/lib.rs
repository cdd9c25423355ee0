//! # pagerx: multichannel POCSAG/FLEX pager monitoring
//!
//! This crate holds the decode-side logic of a pager monitoring station
//! that watches several paging frequencies at once from a single
//! software-defined receiver:
//!
//! * a [channel plan](ChannelPlan) deriving the signal-chain parameters
//!   (decimation, resample ratio, discriminator gain, filter shape) each
//!   narrowband slice needs,
//! * a [parser](parse_line) that turns the mixed structured/plain-text
//!   output of a `multimon-ng` decoder into canonical [`PageEvent`]s,
//! * a [`SpamFilter`] for suppressing filler traffic.
//!
//! Everything here is pure and synchronous. Subprocess management, the
//! signal engine boundary, and persistence live in the `pagerxd` daemon,
//! which drives this crate.
//!
//! ## Example
//!
//! ```
//! use pagerx::{parse_line, SpamFilter};
//!
//! let line = r#"{"demod_name":"POCSAG1200","address":1234567,"alpha":"CALL DISPATCH"}"#;
//! let page = parse_line("Hospital", line).expect("a page");
//! assert_eq!(page.source, "Hospital (POCSAG1200)");
//! assert_eq!(page.recipient, "1234567");
//! assert_eq!(page.content, "CALL DISPATCH");
//!
//! let spam = SpamFilter::new(true);
//! assert!(spam.accept(&page.content));
//! ```
//!
//! Lines that match no known decoder dialect simply produce no event:
//!
//! ```
//! # use pagerx::parse_line;
//! assert!(parse_line("Hospital", "Enabled demodulators: POCSAG1200").is_none());
//! ```

mod config;
mod event;
mod parser;
mod plan;
mod spam;

pub use config::{ChannelConfig, ChannelPlanConfig, ConfigError};
pub use event::PageEvent;
pub use parser::{clean_content, parse_line};
pub use plan::{
    plan_channels, ChannelPlan, AUDIO_RATE, AUDIO_SCALE, CHANNEL_BANDWIDTH, CHANNEL_DECIMATION,
    MAX_DEVIATION, TRANSITION_WIDTH,
};
pub use spam::SpamFilter;
