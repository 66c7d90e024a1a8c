use adw::prelude::*;
use adw::{HeaderBar, StatusPage};
use gtk4::{gio, glib, Box, Button, Image, Label, ListBox, Orientation, ScrolledWindow, SearchEntry, Window};
use std::cell::RefCell;
use std::rc::Rc;

use crate::logger::{log_error, log_info};
use crate::output_dialog;
use crate::parser::{PackageEntry, PatternParser};
use crate::row::{ActionsInFlight, PackageRow};
use crate::search::{SearchController, SearchOutcome};
use crate::session::{Exit, SessionRegistry};
use crate::settings::{self, AppSettings};
use crate::subprocess::{self, GioChild};
use crate::utils;
use crate::yay::{Action, YayBackend};

pub struct PackerGui {
    main_box: Box,
}

/// State shared by the window's handlers.
struct Context {
    settings: AppSettings,
    backend: YayBackend,
    controller: Rc<SearchController>,
    list_box: ListBox,
    status_label: Label,
    sessions: SessionRegistry<GioChild>,
    last_query: RefCell<Option<String>>,
    in_flight: RefCell<ActionsInFlight>,
    rows: RefCell<Vec<(Rc<RefCell<PackageRow>>, glib::WeakRef<Button>)>>,
}

impl PackerGui {
    pub fn new(sessions: SessionRegistry<GioChild>) -> Self {
        let settings = settings::get();
        let backend = YayBackend::from_settings(&settings);
        let main_box = Box::new(Orientation::Vertical, 0);

        let header_bar = HeaderBar::new();
        let title_box = Box::new(Orientation::Horizontal, 8);
        let app_icon = Image::from_icon_name("system-software-install-symbolic");
        app_icon.set_pixel_size(20);
        title_box.append(&app_icon);
        let title_label = Label::new(Some("Yay Packer"));
        title_label.add_css_class("title");
        title_box.append(&title_label);
        header_bar.set_title_widget(Some(&title_box));
        main_box.append(&header_bar);

        if !backend.is_installed() {
            let status_page = StatusPage::builder()
                .icon_name("dialog-error-symbolic")
                .title(format!("{} Not Found", backend.package_manager()))
                .description(format!(
                    "The {} AUR helper is not installed on your system.\n\nInstall it first:\n\ngit clone https://aur.archlinux.org/yay.git\ncd yay && makepkg -si",
                    backend.package_manager()
                ))
                .build();
            status_page.set_vexpand(true);
            main_box.append(&status_page);
            return Self { main_box };
        }

        let content = Box::new(Orientation::Vertical, 12);
        content.set_margin_start(16);
        content.set_margin_end(16);
        content.set_margin_top(12);
        content.set_margin_bottom(16);

        let search_entry = SearchEntry::new();
        search_entry.set_placeholder_text(Some("Type to search and press Enter..."));
        content.append(&search_entry);

        let status_label = Label::new(None);
        status_label.add_css_class("dim-label");
        status_label.add_css_class("caption");
        status_label.set_halign(gtk4::Align::Start);
        content.append(&status_label);

        let scrolled = ScrolledWindow::new();
        scrolled.set_vexpand(true);
        let list_box = ListBox::new();
        list_box.add_css_class("boxed-list");
        list_box.set_selection_mode(gtk4::SelectionMode::None);
        list_box.set_valign(gtk4::Align::Start);
        scrolled.set_child(Some(&list_box));
        content.append(&scrolled);

        let actions = Box::new(Orientation::Horizontal, 8);
        actions.set_halign(gtk4::Align::End);
        let fix_btn = Button::with_label("Fix errors");
        fix_btn.add_css_class("flat");
        fix_btn.set_tooltip_text(Some("Open the pacman troubleshooting guide"));
        let update_btn = Button::with_label("Update system");
        update_btn.add_css_class("suggested-action");
        update_btn.set_tooltip_text(Some("Upgrade every installed package"));
        actions.append(&fix_btn);
        actions.append(&update_btn);
        content.append(&actions);

        main_box.append(&content);

        let controller = Rc::new(SearchController::new(
            backend.clone(),
            std::boxed::Box::new(PatternParser::new(&settings.installed_label)),
        ));
        let context = Rc::new(Context {
            settings,
            backend,
            controller,
            list_box,
            status_label,
            sessions,
            last_query: RefCell::new(None),
            in_flight: RefCell::new(ActionsInFlight::new()),
            rows: RefCell::new(Vec::new()),
        });

        let ctx = context.clone();
        search_entry.connect_activate(move |entry| {
            let query = entry.text().trim().to_string();
            if !query.is_empty() {
                Context::run_search(&ctx, query);
            }
        });

        let ctx = Rc::downgrade(&context);
        update_btn.connect_clicked(move |_| {
            if let Some(ctx) = ctx.upgrade() {
                Context::launch(&ctx, Action::UpdateSystem, "", |_| {});
            }
        });

        let ctx = Rc::downgrade(&context);
        fix_btn.connect_clicked(move |_| {
            if let Some(ctx) = ctx.upgrade() {
                ctx.open_help();
            }
        });

        Self { main_box }
    }

    pub fn main_widget(&self) -> &Box {
        &self.main_box
    }
}

impl Context {
    fn parent_window(&self) -> Option<Window> {
        self.list_box
            .root()
            .and_then(|root| root.downcast::<Window>().ok())
    }

    fn run_search(ctx: &Rc<Self>, query: String) {
        log_info(&format!("Searching for '{}'", query));
        *ctx.last_query.borrow_mut() = Some(query.clone());
        ctx.status_label.remove_css_class("error");
        ctx.status_label.set_text("Searching...");

        let ctx = ctx.clone();
        glib::spawn_future_local(async move {
            let Some(outcome) = ctx.controller.clone().search(query).await else {
                return;
            };
            match outcome {
                SearchOutcome::Results(entries) => {
                    ctx.status_label.set_text(&match entries.len() {
                        0 => "No packages found".to_string(),
                        1 => "Found 1 package".to_string(),
                        n => format!("Found {} packages", n),
                    });
                    Self::populate(&ctx, entries);
                }
                SearchOutcome::Failed(e) => {
                    ctx.status_label.add_css_class("error");
                    ctx.status_label.set_text(&format!("Search failed: {}", e));
                    Self::populate(&ctx, Vec::new());
                }
            }
        });
    }

    fn rerun_last_search(ctx: &Rc<Self>) {
        let query = ctx.last_query.borrow().clone();
        if let Some(query) = query {
            Self::run_search(ctx, query);
        }
    }

    fn populate(ctx: &Rc<Self>, entries: Vec<PackageEntry>) {
        while let Some(child) = ctx.list_box.first_child() {
            ctx.list_box.remove(&child);
        }
        ctx.rows.borrow_mut().clear();
        for entry in entries {
            let row = Self::create_row(ctx, entry);
            ctx.list_box.append(&row);
        }
    }

    fn create_row(ctx: &Rc<Self>, entry: PackageEntry) -> Box {
        let row_box = Box::new(Orientation::Horizontal, 12);
        row_box.set_margin_start(12);
        row_box.set_margin_end(12);
        row_box.set_margin_top(6);
        row_box.set_margin_bottom(6);

        let name_label = Label::new(Some(&entry.identifier));
        name_label.set_halign(gtk4::Align::Start);
        name_label.set_hexpand(true);
        name_label.set_ellipsize(gtk4::pango::EllipsizeMode::End);
        row_box.append(&name_label);

        let model = Rc::new(RefCell::new(ctx.in_flight.borrow().row_for(entry)));
        let button = Button::with_label(model.borrow().caption());
        button.set_size_request(110, -1);
        style_toggle(&button, &model.borrow());
        row_box.append(&button);
        ctx.rows
            .borrow_mut()
            .push((model.clone(), button.downgrade()));

        let ctx = Rc::downgrade(ctx);
        button.connect_clicked(move |btn| {
            let Some(ctx) = ctx.upgrade() else {
                return;
            };
            let Some(action) = model.borrow_mut().click() else {
                return;
            };
            let package = model.borrow().entry().package_name().to_string();
            if !ctx.in_flight.borrow_mut().start(&package, action) {
                model.borrow_mut().complete(false);
                return;
            }
            style_toggle(btn, &model.borrow());

            let weak = Rc::downgrade(&ctx);
            let name = package.clone();
            Self::launch(&ctx, action, &package, move |exit| {
                if let Some(ctx) = weak.upgrade() {
                    ctx.settle(&name, exit.success());
                }
            });
        });

        row_box
    }

    /// Clear the running action for `package` and update whichever rows show
    /// it now, which may belong to a newer search than the one clicked.
    fn settle(&self, package: &str, success: bool) {
        self.in_flight.borrow_mut().finish(package);
        for (model, button) in self.rows.borrow().iter() {
            if model.borrow().entry().package_name() != package {
                continue;
            }
            model.borrow_mut().complete(success);
            if let Some(button) = button.upgrade() {
                style_toggle(&button, &model.borrow());
            }
        }
    }

    /// Spawn `action` in its own output window. `on_finished` runs when the
    /// process ends, before the optional notification and re-search.
    fn launch<F>(ctx: &Rc<Self>, action: Action, package: &str, on_finished: F)
    where
        F: Fn(&Exit) + 'static,
    {
        let spec = ctx.backend.action_command(action, package);
        log_info(&format!("{}: {}", action.title(), spec));

        let session = subprocess::spawn_session(&spec);
        ctx.sessions.insert(session.clone());
        log_info(&format!("{} action(s) running", ctx.sessions.active_count()));

        let title = if package.is_empty() {
            action.title().to_string()
        } else {
            format!("{} {}", action.title(), package)
        };
        let show_progress =
            action != Action::UpdateSystem && ctx.settings.show_progress_on_actions;

        let weak = Rc::downgrade(ctx);
        let notify_title = title.clone();
        output_dialog::show(
            ctx.parent_window().as_ref(),
            &title,
            session,
            show_progress,
            move |exit| {
                on_finished(exit);
                let Some(ctx) = weak.upgrade() else {
                    return;
                };
                if ctx.settings.notify_on_task_complete {
                    let (summary, body) = utils::completion_message(&notify_title, exit.success());
                    utils::send_notification(&summary, &body);
                }
                if exit.success() && ctx.settings.research_after_action {
                    Self::rerun_last_search(&ctx);
                }
            },
        );
    }

    fn open_help(&self) {
        let url = self.settings.help_url.as_str();
        log_info(&format!("Opening help page {}", url));
        if let Err(e) = gio::AppInfo::launch_default_for_uri(url, None::<&gio::AppLaunchContext>) {
            log_error(&format!("Failed to open {}: {}", url, e));
            self.status_label.add_css_class("error");
            self.status_label
                .set_text(&format!("Could not open browser: {}", e.message()));
        }
    }
}

fn style_toggle(button: &Button, row: &PackageRow) {
    button.set_label(row.caption());
    button.set_sensitive(!row.is_busy());
    if row.is_installed() {
        button.remove_css_class("suggested-action");
        button.add_css_class("destructive-action");
    } else {
        button.remove_css_class("destructive-action");
        button.add_css_class("suggested-action");
    }
}
