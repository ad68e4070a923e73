//! Snapshot of the window and application state visible to the user.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    pub frontmost: Option<AppRef>,
    pub apps: Vec<AppRef>,
    pub windows: Vec<WindowRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppRef {
    pub name: String,
    pub bundle_id: Option<String>,
    /// Ordinary dock-visible application (as opposed to agents and daemons).
    pub regular: bool,
    pub hidden: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowRef {
    pub owner: String,
    pub layer: i64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl WindowRef {
    pub fn area(&self) -> f64 { self.width.max(0.0) * self.height.max(0.0) }
}

pub trait WorkspaceObserver: Send + Sync {
    fn observe(&self) -> Observation;
}

/// Observer for hosts without a window server; every observation is empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl WorkspaceObserver for NullObserver {
    fn observe(&self) -> Observation { Observation::default() }
}

#[cfg(target_os = "macos")]
pub use macos::SystemObserver;

#[cfg(target_os = "macos")]
mod macos {
    use objc2::rc::{Retained, autoreleasepool};
    use objc2::runtime::AnyObject;
    use objc2_app_kit::{NSApplicationActivationPolicy, NSRunningApplication, NSWorkspace};
    use objc2_core_foundation::CFArray;
    use objc2_core_graphics::{CGWindowListCopyWindowInfo, CGWindowListOption, kCGNullWindowID};
    use objc2_foundation::{NSArray, NSDictionary, NSNumber, NSString, ns_string};
    use tracing::trace;

    use super::{AppRef, Observation, WindowRef, WorkspaceObserver};

    #[derive(Debug, Default, Clone, Copy)]
    pub struct SystemObserver;

    impl WorkspaceObserver for SystemObserver {
        fn observe(&self) -> Observation {
            autoreleasepool(|_| {
                let workspace = NSWorkspace::sharedWorkspace();
                let frontmost = workspace.frontmostApplication().map(|app| app_ref(&app));
                let apps = workspace.runningApplications().iter().map(|app| app_ref(&app)).collect();
                let windows = on_screen_windows();
                trace!(windows = windows.len(), "Observed workspace");
                Observation { frontmost, apps, windows }
            })
        }
    }

    fn app_ref(app: &NSRunningApplication) -> AppRef {
        AppRef {
            name: app.localizedName().map(|n| n.to_string()).unwrap_or_default(),
            bundle_id: app.bundleIdentifier().map(|b| b.to_string()),
            regular: app.activationPolicy() == NSApplicationActivationPolicy::Regular,
            hidden: app.isHidden(),
        }
    }

    fn on_screen_windows() -> Vec<WindowRef> {
        let options =
            CGWindowListOption::OptionOnScreenOnly | CGWindowListOption::ExcludeDesktopElements;
        let Some(list) = CGWindowListCopyWindowInfo(options, kCGNullWindowID) else {
            return Vec::new();
        };
        // SAFETY: CFArray is toll-free bridged with NSArray, and the window list
        // holds dictionaries keyed by strings.
        let list: &NSArray<NSDictionary<AnyObject, AnyObject>> =
            unsafe { &*(&*list as *const CFArray).cast() };
        list.iter().filter_map(|info| window_ref(&info)).collect()
    }

    fn window_ref(info: &NSDictionary<AnyObject, AnyObject>) -> Option<WindowRef> {
        let owner = info.objectForKey(ns_string!("kCGWindowOwnerName"))?;
        let owner = owner.downcast::<NSString>().ok()?.to_string();
        let layer = number(info, ns_string!("kCGWindowLayer"))?.integerValue() as i64;
        let bounds = info.objectForKey(ns_string!("kCGWindowBounds"))?;
        let bounds = bounds.downcast::<NSDictionary>().ok()?;
        Some(WindowRef {
            owner,
            layer,
            x: number(&bounds, ns_string!("X"))?.doubleValue(),
            y: number(&bounds, ns_string!("Y"))?.doubleValue(),
            width: number(&bounds, ns_string!("Width"))?.doubleValue(),
            height: number(&bounds, ns_string!("Height"))?.doubleValue(),
        })
    }

    fn number(dict: &NSDictionary<AnyObject, AnyObject>, key: &NSString) -> Option<Retained<NSNumber>> {
        dict.objectForKey(key)?.downcast::<NSNumber>().ok()
    }
}
