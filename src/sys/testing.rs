use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::clock::Clock;
use super::defaults::{Toggle, ToggleError};
use super::skylight::{ActiveSpaceSource, SourceUnavailable};
use super::spaces_plist::{LayoutError, LayoutSource};
use super::window_server::{AppRef, Observation, WindowRef, WorkspaceObserver};

/// Builds an XML spaces document with one inner slice per monitor.
pub fn spaces_document(monitors: &[&[(u64, &str)]]) -> String {
    let mut doc = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<plist version=\"1.0\"><dict>\
         <key>SpacesDisplayConfiguration</key><dict>\
         <key>Management Data</key><dict><key>Monitors</key><array>",
    );
    for spaces in monitors {
        doc.push_str("<dict><key>Spaces</key><array>");
        for (id, uuid) in spaces.iter() {
            write!(
                doc,
                "<dict><key>ManagedSpaceID</key><integer>{id}</integer>\
                 <key>uuid</key><string>{uuid}</string></dict>"
            )
            .unwrap();
        }
        doc.push_str("</array></dict>");
    }
    doc.push_str("</array></dict></dict></dict></plist>");
    doc
}

#[derive(Default)]
pub struct FakeSpaceSource {
    pub answer: Mutex<Option<u64>>,
}

impl FakeSpaceSource {
    pub fn unsupported() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn set(&self, id: Option<u64>) { *self.answer.lock() = id; }
}

impl ActiveSpaceSource for FakeSpaceSource {
    fn active_space(&self) -> Result<u64, SourceUnavailable> {
        self.answer.lock().ok_or(SourceUnavailable("fake"))
    }
}

#[derive(Default)]
pub struct FakeObserver {
    pub observation: Mutex<Observation>,
}

impl FakeObserver {
    pub fn set(&self, observation: Observation) { *self.observation.lock() = observation; }
}

impl WorkspaceObserver for FakeObserver {
    fn observe(&self) -> Observation { self.observation.lock().clone() }
}

/// Observation with one regular app owning one window at `(x, y)`.
pub fn desk(app: &str, x: f64, y: f64) -> Observation {
    let app_ref = AppRef {
        name: app.to_string(),
        bundle_id: Some(format!("com.example.{}", app.to_lowercase())),
        regular: true,
        hidden: false,
    };
    Observation {
        frontmost: Some(app_ref.clone()),
        apps: vec![app_ref],
        windows: vec![WindowRef {
            owner: app.to_string(),
            layer: 0,
            x,
            y,
            width: 800.0,
            height: 600.0,
        }],
    }
}

#[derive(Default)]
pub struct FakeLayoutSource {
    pub document: Mutex<Option<String>>,
    pub reads: AtomicUsize,
}

impl FakeLayoutSource {
    pub fn with(monitors: &[&[(u64, &str)]]) -> Arc<Self> {
        let source = Self::default();
        source.set(monitors);
        Arc::new(source)
    }

    pub fn set(&self, monitors: &[&[(u64, &str)]]) {
        *self.document.lock() = Some(spaces_document(monitors));
    }

    pub fn set_raw(&self, document: Option<&str>) {
        *self.document.lock() = document.map(str::to_string);
    }

    pub fn reads(&self) -> usize { self.reads.load(Ordering::SeqCst) }
}

impl LayoutSource for FakeLayoutSource {
    fn read(&self) -> Result<Vec<u8>, LayoutError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match &*self.document.lock() {
            Some(doc) => Ok(doc.clone().into_bytes()),
            None => Err(LayoutError::Io(std::io::ErrorKind::NotFound.into())),
        }
    }
}

pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> { Arc::new(ManualClock { now: Mutex::new(Instant::now()) }) }

    pub fn advance(&self, by: Duration) { *self.now.lock() += by; }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant { *self.now.lock() }
}

#[derive(Default)]
pub struct FakeToggle {
    pub value: Mutex<bool>,
    pub writes: AtomicUsize,
    pub fail_writes: Mutex<bool>,
}

impl FakeToggle {
    pub fn writes(&self) -> usize { self.writes.load(Ordering::SeqCst) }

    pub fn value(&self) -> bool { *self.value.lock() }
}

impl Toggle for FakeToggle {
    fn read(&self) -> Result<bool, ToggleError> { Ok(*self.value.lock()) }

    fn write(&self, enabled: bool) -> Result<(), ToggleError> {
        if *self.fail_writes.lock() {
            return Err(ToggleError::Unparseable("write refused".into()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.value.lock() = enabled;
        Ok(())
    }
}
