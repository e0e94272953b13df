use std::cell::RefCell;
use std::rc::Rc;

use gtk4::gio;
use gtk4::prelude::*;
use libadwaita as adw;

use mdnotes_core::events::{EventSender, ShellEvent};
use mdnotes_core::settings::Settings;

/// Ask for a notes directory and post the answer as `DirectoryChosen`.
/// Dismissing the dialog posts `None`.
pub fn prompt_for_notes(
    app: &adw::Application,
    settings: &Rc<RefCell<Settings>>,
    events: &EventSender,
) {
    let dialog = gtk4::FileDialog::builder()
        .title(settings.borrow().prompt_title.as_str())
        .accept_label("Open")
        .modal(true)
        .build();
    if let Some(dir) = settings.borrow().initial_directory() {
        dialog.set_initial_folder(Some(&gio::File::for_path(dir)));
    }

    // Keep the application alive while no window is open yet.
    let hold = app.hold();
    let parent = app.active_window();
    let settings = settings.clone();
    let events = events.clone();
    dialog.select_folder(parent.as_ref(), gio::Cancellable::NONE, move |result| {
        let _hold = hold;
        let chosen = match result {
            Ok(folder) => folder.path(),
            Err(e) => {
                log::debug!("Open prompt closed without a folder: {}", e);
                None
            }
        };
        if let Some(dir) = &chosen {
            settings.borrow_mut().remember_directory(dir);
        }
        if events.send(ShellEvent::DirectoryChosen(chosen)).is_err() {
            log::warn!("Event loop is gone, dropping chosen directory");
        }
    });
}
