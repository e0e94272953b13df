use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use gtk4::gio;
use gtk4::glib;
use gtk4::prelude::*;
use libadwaita as adw;

use mdnotes_core::events::{EventSender, ShellEvent};
use mdnotes_core::gatekeeper::NavigationGatekeeper;
use mdnotes_core::manager::WindowHost;
use mdnotes_core::registry::WindowId;
use mdnotes_core::runtime::RuntimeError;
use mdnotes_core::settings::Settings;

use crate::webview;

struct NotesWindow {
    window: adw::ApplicationWindow,
    toolbar: adw::ToolbarView,
    placeholder: adw::StatusPage,
}

/// GTK side of the session window manager.
///
/// Each window carries its `WindowId` in its widget name and reports its
/// close through the shell event channel.
pub struct GtkWindowHost {
    app: adw::Application,
    settings: Rc<RefCell<Settings>>,
    events: EventSender,
    windows: HashMap<WindowId, NotesWindow>,
}

impl GtkWindowHost {
    pub fn new(
        app: adw::Application,
        settings: Rc<RefCell<Settings>>,
        events: EventSender,
    ) -> Self {
        Self {
            app,
            settings,
            events,
            windows: HashMap::new(),
        }
    }
}

impl WindowHost for GtkWindowHost {
    fn create_window(&mut self, id: WindowId, title: &str) {
        let (width, height) = {
            let settings = self.settings.borrow();
            (settings.window_width, settings.window_height)
        };

        let spinner = gtk4::Spinner::new();
        spinner.set_spinning(true);
        spinner.set_size_request(32, 32);
        let placeholder = adw::StatusPage::builder()
            .title("Opening notes…")
            .description(title)
            .child(&spinner)
            .build();

        let toolbar = adw::ToolbarView::new();
        toolbar.add_top_bar(&build_header_bar(title));
        toolbar.set_content(Some(&placeholder));

        let window = adw::ApplicationWindow::builder()
            .application(&self.app)
            .title(title)
            .default_width(width)
            .default_height(height)
            .content(&toolbar)
            .build();
        window.set_widget_name(&format!("mdnotes-window-{}", id.as_raw()));

        {
            let events = self.events.clone();
            let settings = self.settings.clone();
            window.connect_close_request(move |window| {
                if window.width() > 0 && window.height() > 0 {
                    let mut settings = settings.borrow_mut();
                    settings.window_width = window.width();
                    settings.window_height = window.height();
                }
                if events.send(ShellEvent::WindowClosed(id)).is_err() {
                    log::warn!("Event loop is gone, {} closed unnoticed", id);
                }
                glib::Propagation::Proceed
            });
        }

        window.present();
        self.windows.insert(
            id,
            NotesWindow {
                window,
                toolbar,
                placeholder,
            },
        );
    }

    fn attach_session(&mut self, id: WindowId, base_url: &str, gatekeeper: NavigationGatekeeper) {
        let Some(notes) = self.windows.get(&id) else {
            log::warn!("{} is gone, not attaching {}", id, base_url);
            return;
        };

        let view = webview::build_notes_view(gatekeeper);
        notes.toolbar.set_content(Some(&view));
        view.load_uri(base_url);
        log::debug!("{} ({}) loading {}", id, notes.window.widget_name(), base_url);
    }

    fn show_open_failure(&mut self, id: WindowId, error: &RuntimeError) {
        let Some(notes) = self.windows.get(&id) else {
            return;
        };
        notes.placeholder.set_icon_name(Some("dialog-error-symbolic"));
        notes.placeholder.set_title("Could not open notes");
        notes.placeholder.set_description(Some(&error.to_string()));
        notes.placeholder.set_child(None::<&gtk4::Widget>);
    }

    fn release_window(&mut self, id: WindowId) {
        self.windows.remove(&id);
    }
}

fn build_header_bar(path: &str) -> adw::HeaderBar {
    let name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());

    let header = adw::HeaderBar::new();
    header.set_title_widget(Some(&adw::WindowTitle::new(&name, path)));

    let open_button = gtk4::Button::from_icon_name("folder-open-symbolic");
    open_button.set_tooltip_text(Some("Open Notes… (Ctrl+O)"));
    open_button.set_action_name(Some("app.open"));
    header.pack_start(&open_button);

    let menu = gio::Menu::new();
    menu.append(Some("Open Notes…"), Some("app.open"));
    menu.append(Some("Quit"), Some("app.quit"));
    let menu_button = gtk4::MenuButton::builder()
        .icon_name("open-menu-symbolic")
        .menu_model(&menu)
        .primary(true)
        .build();
    header.pack_end(&menu_button);

    header
}
