mod app;
mod dialogs;
mod webview;
mod window;

use gtk4::glib;
use libadwaita as adw;
use libadwaita::prelude::*;

const APP_ID: &str = "dev.mdnotes.MdNotes";

fn main() -> glib::ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = mdnotes_core::settings::load();
    if settings.import_login_environment {
        mdnotes_core::environment::apply_login_environment();
    }

    // No session can ever work without the runtime, so this is the one
    // failure that stops the application.
    let runtime = match mdnotes_ffi::create() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("{}", e);
            return glib::ExitCode::FAILURE;
        }
    };

    let app = adw::Application::builder().application_id(APP_ID).build();
    app::install(&app, runtime, settings);
    app.run()
}
