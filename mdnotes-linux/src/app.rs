use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use gtk4::gio;
use gtk4::glib;
use gtk4::prelude::*;
use libadwaita as adw;

use mdnotes_core::events::{event_channel, EventReceiver, EventSender};
use mdnotes_core::gatekeeper::SystemLauncher;
use mdnotes_core::manager::SessionWindowManager;
use mdnotes_core::runtime::RuntimeClient;
use mdnotes_core::settings::{self, Settings};

use crate::dialogs;
use crate::window::GtkWindowHost;

/// The manager lives until shutdown, where it is taken out and shut down so
/// the runtime is released before the process exits.
type SharedManager = Rc<RefCell<Option<SessionWindowManager<GtkWindowHost>>>>;

/// Read by the event pump and closed at shutdown.
type SharedReceiver = Rc<RefCell<EventReceiver>>;

pub fn install(app: &adw::Application, runtime: RuntimeClient, settings: Settings) {
    let settings = Rc::new(RefCell::new(settings));
    let (events, receiver) = event_channel();

    let host = GtkWindowHost::new(app.clone(), settings.clone(), events.clone());
    let manager: SharedManager = Rc::new(RefCell::new(Some(SessionWindowManager::new(
        runtime,
        host,
        events.clone(),
        Arc::new(SystemLauncher),
    ))));
    let receiver: SharedReceiver = Rc::new(RefCell::new(receiver));

    {
        let manager = manager.clone();
        let receiver = receiver.clone();
        let settings = settings.clone();
        let events = events.clone();
        app.connect_startup(move |app| {
            install_actions(app, &settings, &events);
            pump_events(manager.clone(), receiver.clone());
        });
    }

    {
        let settings = settings.clone();
        app.connect_activate(move |app| {
            dialogs::prompt_for_notes(app, &settings, &events);
        });
    }

    app.connect_shutdown(move |_| {
        let manager = match manager.try_borrow_mut() {
            Ok(mut slot) => slot.take(),
            Err(_) => {
                log::error!("Session manager busy at shutdown, sessions left to the runtime");
                None
            }
        };
        if let Some(manager) = manager {
            match receiver.try_borrow_mut() {
                Ok(mut receiver) => manager.shutdown(&mut receiver),
                Err(_) => log::error!("Event queue busy at shutdown, releasing the runtime anyway"),
            }
        }
        if let Err(e) = settings::save(&settings.borrow()) {
            log::warn!("Failed to save settings: {}", e);
        }
    });
}

/// Feed shell events to the manager on the GTK main loop. Ends once the
/// receiver is closed at shutdown.
fn pump_events(manager: SharedManager, receiver: SharedReceiver) {
    glib::spawn_future_local(async move {
        loop {
            // Borrow only while polling so shutdown can close the receiver.
            let next = std::future::poll_fn(|cx| receiver.borrow_mut().poll_recv(cx));
            let Some(event) = next.await else {
                break;
            };
            run_guarded_ui("shell-event", || {
                if let Some(manager) = manager.borrow_mut().as_mut() {
                    manager.handle_event(event);
                }
            });
        }
        log::debug!("Shell event pump stopped");
    });
}

fn install_actions(
    app: &adw::Application,
    settings: &Rc<RefCell<Settings>>,
    events: &EventSender,
) {
    // app.open
    {
        let action = gio::SimpleAction::new("open", None);
        let app_weak = app.downgrade();
        let settings = settings.clone();
        let events = events.clone();
        action.connect_activate(move |_, _| {
            if let Some(app) = app_weak.upgrade() {
                dialogs::prompt_for_notes(&app, &settings, &events);
            }
        });
        app.add_action(&action);
        app.set_accels_for_action("app.open", &["<Primary>o"]);
    }

    // app.quit
    {
        let action = gio::SimpleAction::new("quit", None);
        let app_weak = app.downgrade();
        action.connect_activate(move |_, _| {
            if let Some(app) = app_weak.upgrade() {
                app.quit();
            }
        });
        app.add_action(&action);
        app.set_accels_for_action("app.quit", &["<Primary>q"]);
    }
}

fn run_guarded_ui<F: FnOnce()>(label: &str, f: F) {
    if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "non-string panic payload"
        };
        log::error!("UI callback panic in '{}': {}", label, msg);
    }
}
