//! HLS playlist parsing (spec §4.2, Playlist Parser).
//!
//! Hand-rolled rather than delegated to a general-purpose HLS crate: the
//! directory-replacement URL resolution with query-merge semantics and the
//! "most recent preceding duration tag" rule are narrower than what a
//! general parser assumes, and closed enough to implement directly (decision
//! recorded in DESIGN.md).

mod attrs;
mod master;
mod media;
mod url_resolve;

pub use master::{parse_master, MasterPlaylistEntry};
pub use media::{parse_media, ByteRange, MediaPlaylist, Segment};
pub use url_resolve::resolve_url;
