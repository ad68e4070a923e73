//! Bridges workspace notifications into space monitor triggers.
//!
//! Observers are registered with the shared workspace's notification center
//! and are delivered on the main thread's run loop, so [`NotificationCenter`]
//! must be created on the main thread and kept alive while it runs.

use objc2::rc::Retained;
use objc2::{AnyThread, DefinedClass, define_class, msg_send, sel};
use objc2_app_kit::{
    NSWorkspace, NSWorkspaceActiveSpaceDidChangeNotification,
    NSWorkspaceDidActivateApplicationNotification,
};
use objc2_foundation::{NSNotification, NSObject};
use tracing::{info_span, trace};

use super::space_monitor::{self, Trigger};

struct Instance {
    triggers_tx: space_monitor::Sender,
}

define_class! {
    // SAFETY:
    // - The superclass NSObject does not have any subclassing requirements.
    // - `NotificationCenterInner` does not implement `Drop`.
    #[unsafe(super(NSObject))]
    #[ivars = Instance]
    struct NotificationCenterInner;

    // SAFETY: Each of these method signatures must match their registration
    // below.
    impl NotificationCenterInner {
        #[unsafe(method(recvSpaceChanged:))]
        fn recv_space_changed(&self, notif: &NSNotification) {
            let _s = info_span!("notification_center::space_changed").entered();
            trace!("{notif:#?}");
            self.ivars().triggers_tx.send(Trigger::ActiveSpaceChanged);
        }

        #[unsafe(method(recvAppActivated:))]
        fn recv_app_activated(&self, notif: &NSNotification) {
            let _s = info_span!("notification_center::app_activated").entered();
            trace!("{notif:#?}");
            self.ivars().triggers_tx.send(Trigger::AppActivated);
        }
    }
}

impl NotificationCenterInner {
    fn new(triggers_tx: space_monitor::Sender) -> Retained<Self> {
        let this = Self::alloc().set_ivars(Instance { triggers_tx });
        unsafe { msg_send![super(this), init] }
    }
}

/// Keeps the workspace observers registered until dropped.
pub struct NotificationCenter {
    inner: Retained<NotificationCenterInner>,
}

impl NotificationCenter {
    pub fn new(triggers_tx: space_monitor::Sender) -> Self {
        let handler = NotificationCenterInner::new(triggers_tx);
        let workspace = NSWorkspace::sharedWorkspace();
        let center = workspace.notificationCenter();
        // SAFETY: Both selectors have signature fn(&self, &NSNotification).
        unsafe {
            center.addObserver_selector_name_object(
                &handler,
                sel!(recvSpaceChanged:),
                Some(NSWorkspaceActiveSpaceDidChangeNotification),
                Some(&workspace),
            );
            center.addObserver_selector_name_object(
                &handler,
                sel!(recvAppActivated:),
                Some(NSWorkspaceDidActivateApplicationNotification),
                Some(&workspace),
            );
        }
        NotificationCenter { inner: handler }
    }
}

impl Drop for NotificationCenter {
    fn drop(&mut self) {
        let center = NSWorkspace::sharedWorkspace().notificationCenter();
        // SAFETY: The handler was registered with this center in `new`.
        unsafe { center.removeObserver(&self.inner) };
    }
}
