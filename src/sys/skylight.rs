//! Late-bound access to the private SkyLight framework.
//!
//! The framework is opened once at startup. If the library or either symbol
//! is missing, the source stays unsupported for the life of the process and
//! is never looked up again.

use std::ffi::OsStr;

use libloading::Library;
use thiserror::Error;
use tracing::{debug, info, warn};

const SKYLIGHT_PATH: &str = "/System/Library/PrivateFrameworks/SkyLight.framework/SkyLight";

// The CGS names are older aliases exported alongside the SLS ones.
const MAIN_CONNECTION_SYMBOLS: [&[u8]; 2] = [b"SLSMainConnectionID\0", b"CGSMainConnectionID\0"];
const ACTIVE_SPACE_SYMBOLS: [&[u8]; 2] = [b"SLSGetActiveSpace\0", b"CGSGetActiveSpace\0"];

type MainConnectionFn = unsafe extern "C" fn() -> i32;
type GetActiveSpaceFn = unsafe extern "C" fn(i32) -> u64;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("{0} is unavailable")]
pub struct SourceUnavailable(pub &'static str);

/// Reports the compositor's notion of the active space.
pub trait ActiveSpaceSource: Send + Sync {
    /// Raw active space id. `Ok(0)` means the source answered but does not
    /// know.
    fn active_space(&self) -> Result<u64, SourceUnavailable>;
}

struct Bound {
    // Keeps the symbols below valid.
    _library: Library,
    main_connection: MainConnectionFn,
    active_space: GetActiveSpaceFn,
}

pub struct SkylightSource {
    bound: Option<Bound>,
}

impl SkylightSource {
    pub fn load() -> SkylightSource { Self::load_from(SKYLIGHT_PATH) }

    pub fn load_from(path: impl AsRef<OsStr>) -> SkylightSource {
        let path = path.as_ref();
        // SAFETY: SkyLight has no library initializers with preconditions.
        let bound = match unsafe { Library::new(path) } {
            Ok(library) => Self::bind(library),
            Err(err) => {
                debug!(?path, %err, "SkyLight not available; active space query disabled");
                None
            }
        };
        if bound.is_some() {
            info!("Bound SkyLight active space query");
        }
        SkylightSource { bound }
    }

    pub fn unsupported() -> SkylightSource { SkylightSource { bound: None } }

    pub fn is_supported(&self) -> bool { self.bound.is_some() }

    fn bind(library: Library) -> Option<Bound> {
        let main_connection = Self::lookup::<MainConnectionFn>(&library, &MAIN_CONNECTION_SYMBOLS);
        let active_space = Self::lookup::<GetActiveSpaceFn>(&library, &ACTIVE_SPACE_SYMBOLS);
        match (main_connection, active_space) {
            (Some(main_connection), Some(active_space)) => Some(Bound {
                _library: library,
                main_connection,
                active_space,
            }),
            (main_connection, active_space) => {
                warn!(
                    has_main_connection = main_connection.is_some(),
                    has_active_space = active_space.is_some(),
                    "SkyLight is missing required symbols; active space query disabled"
                );
                None
            }
        }
    }

    fn lookup<T: Copy>(library: &Library, names: &[&[u8]]) -> Option<T> {
        names.iter().find_map(|name| {
            // SAFETY: the declared function types match the exported signatures.
            unsafe { library.get::<T>(name) }.ok().map(|symbol| *symbol)
        })
    }
}

impl ActiveSpaceSource for SkylightSource {
    fn active_space(&self) -> Result<u64, SourceUnavailable> {
        let bound = self.bound.as_ref().ok_or(SourceUnavailable("SkyLight"))?;
        // SAFETY: both pointers were resolved from the library kept alive in `bound`.
        Ok(unsafe { (bound.active_space)((bound.main_connection)()) })
    }
}
