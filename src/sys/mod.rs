//! Seams to the operating system. Each facility sits behind a trait so the
//! engine can run against fakes; the macOS-only pieces are compiled out
//! elsewhere.

pub mod clock;
pub mod defaults;
pub mod skylight;
pub mod spaces_plist;
pub mod window_server;

#[cfg(test)]
pub(crate) mod testing;
