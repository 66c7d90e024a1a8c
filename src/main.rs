use adw::prelude::*;
use adw::{Application, ApplicationWindow, StyleManager};
use gtk4::{gdk, glib, CssProvider};
use std::path::Path;

mod error;
mod logger;
mod output_dialog;
mod parser;
mod row;
mod search;
mod session;
mod settings;
mod subprocess;
mod ui;
mod utils;
mod yay;

use logger::{log_info, log_warning};
use session::SessionRegistry;
use subprocess::GioChild;
use ui::PackerGui;

const APP_ID: &str = "io.github.yaypacker.YayPacker";
const CSS: &str = include_str!("style.css");

fn main() -> glib::ExitCode {
    log_info("Yay Packer starting");

    settings::init();

    let app = Application::builder().application_id(APP_ID).build();
    let sessions: SessionRegistry<GioChild> = SessionRegistry::new();

    app.connect_startup(|_| {
        let style_manager = StyleManager::default();
        match settings::get().theme.as_str() {
            "light" => style_manager.set_color_scheme(adw::ColorScheme::ForceLight),
            "dark" => style_manager.set_color_scheme(adw::ColorScheme::ForceDark),
            _ => style_manager.set_color_scheme(adw::ColorScheme::Default),
        }
        load_css();
    });

    let registry = sessions.clone();
    app.connect_activate(move |app| build_ui(app, registry.clone()));

    app.connect_shutdown(move |_| {
        let signalled = sessions.terminate_all();
        if signalled > 0 {
            log_info(&format!("Sent terminate to {} running process(es) on exit", signalled));
        }
    });

    let exit_code = app.run();
    log_info(&format!("Yay Packer exiting with code: {:?}", exit_code));
    exit_code
}

fn load_css() {
    let Some(display) = gdk::Display::default() else {
        log_info("No display available, skipping CSS provider registration");
        return;
    };

    let provider = CssProvider::new();
    provider.load_from_data(CSS);
    gtk4::style_context_add_provider_for_display(
        &display,
        &provider,
        gtk4::STYLE_PROVIDER_PRIORITY_APPLICATION,
    );
}

fn build_ui(app: &Application, sessions: SessionRegistry<GioChild>) {
    if let Some(window) = app.active_window() {
        window.present();
        return;
    }

    let window = ApplicationWindow::builder()
        .application(app)
        .title("Yay Packer")
        .default_width(560)
        .default_height(520)
        .build();
    window.add_css_class("main-window");
    apply_window_icon(&window, settings::get().icon_path.as_deref());

    let gui = PackerGui::new(sessions);
    window.set_content(Some(gui.main_widget()));
    window.present();

    log_info("UI presented");
}

/// GTK4 windows take icon names, so a custom icon file is exposed through the
/// icon theme search path. Missing files only produce a warning.
fn apply_window_icon(window: &ApplicationWindow, icon_path: Option<&str>) {
    let Some(path) = icon_path.map(Path::new) else {
        window.set_icon_name(Some("system-software-install"));
        return;
    };
    let (Some(dir), Some(stem)) = (path.parent(), path.file_stem().and_then(|s| s.to_str())) else {
        log_warning(&format!("Ignoring unusable icon path {}", path.display()));
        return;
    };
    if !path.is_file() {
        log_warning(&format!("Window icon {} not found", path.display()));
        window.set_icon_name(Some("system-software-install"));
        return;
    }
    if let Some(display) = gdk::Display::default() {
        gtk4::IconTheme::for_display(&display).add_search_path(dir);
    }
    window.set_icon_name(Some(stem));
}
