use gtk4::prelude::*;
use gtk4::{glib, Box, Button, Entry, Orientation, ProgressBar, ScrolledWindow, TextView, Window};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::logger::{log_info, log_warning};
use crate::session::{Exit, SessionState, SharedSession};
use crate::subprocess::GioChild;

/// Widgets whose look depends on the session state.
#[derive(Clone)]
struct Controls {
    action_btn: Button,
    input: Entry,
    progress: Option<ProgressBar>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Look {
    label: &'static str,
    button_sensitive: bool,
    input_sensitive: bool,
}

fn look(state: SessionState) -> Look {
    match state {
        SessionState::Running => Look {
            label: "Abort",
            button_sensitive: true,
            input_sensitive: true,
        },
        // the abort request is out; the process may still ask questions
        SessionState::Aborted => Look {
            label: "Abort",
            button_sensitive: false,
            input_sensitive: true,
        },
        SessionState::Finished => Look {
            label: "Close",
            button_sensitive: true,
            input_sensitive: false,
        },
    }
}

impl Controls {
    fn apply(&self, state: SessionState) {
        let look = look(state);
        self.action_btn.set_label(look.label);
        self.action_btn.set_sensitive(look.button_sensitive);
        self.input.set_sensitive(look.input_sensitive);
        if state == SessionState::Finished {
            self.action_btn.remove_css_class("destructive-action");
            self.action_btn.add_css_class("suggested-action");
            if let Some(progress) = &self.progress {
                progress.set_fraction(1.0);
            }
        }
    }
}

/// Show the live log of `session` in its own window.
///
/// `on_finished` runs once, when the process exits or immediately if it never
/// started.
pub fn show<F>(
    parent: Option<&Window>,
    title: &str,
    session: SharedSession<GioChild>,
    show_progress: bool,
    on_finished: F,
) where
    F: Fn(&Exit) + 'static,
{
    let dialog = Window::builder()
        .title(title)
        .default_width(640)
        .default_height(420)
        .build();
    if let Some(parent) = parent {
        dialog.set_transient_for(Some(parent));
    }

    let vbox = Box::new(Orientation::Vertical, 12);
    vbox.set_margin_start(16);
    vbox.set_margin_end(16);
    vbox.set_margin_top(16);
    vbox.set_margin_bottom(16);

    let command_label = gtk4::Label::new(Some(session.borrow().command()));
    command_label.add_css_class("monospace");
    command_label.add_css_class("dim-label");
    command_label.set_halign(gtk4::Align::Start);
    command_label.set_ellipsize(gtk4::pango::EllipsizeMode::End);
    vbox.append(&command_label);

    let scrolled = ScrolledWindow::new();
    scrolled.set_vexpand(true);
    scrolled.add_css_class("card");

    let text_view = TextView::new();
    text_view.set_editable(false);
    text_view.set_cursor_visible(false);
    text_view.set_monospace(true);
    text_view.set_wrap_mode(gtk4::WrapMode::WordChar);
    text_view.add_css_class("output-log");
    scrolled.set_child(Some(&text_view));
    vbox.append(&scrolled);

    let buffer = text_view.buffer();
    buffer.set_text(session.borrow().log());
    let end_mark = buffer.create_mark(Some("log-end"), &buffer.end_iter(), false);

    let input = Entry::new();
    input.set_placeholder_text(Some("Type a response and press Enter..."));
    vbox.append(&input);

    let progress = if show_progress {
        let bar = ProgressBar::new();
        bar.set_pulse_step(0.05);
        vbox.append(&bar);
        Some(bar)
    } else {
        None
    };

    let action_btn = Button::with_label("Abort");
    action_btn.add_css_class("destructive-action");
    action_btn.set_halign(gtk4::Align::End);
    vbox.append(&action_btn);

    dialog.set_child(Some(&vbox));

    let controls = Controls {
        action_btn: action_btn.clone(),
        input: input.clone(),
        progress: progress.clone(),
    };

    // Log output. Widgets are held weakly so a closed dialog is not kept
    // alive by a still running session.
    let view_weak = text_view.downgrade();
    session.borrow_mut().connect_output(move |chunk| {
        let Some(view) = view_weak.upgrade() else {
            return;
        };
        let buffer = view.buffer();
        buffer.insert(&mut buffer.end_iter(), chunk);
        if let Some(mark) = buffer.mark("log-end") {
            buffer.move_mark(&mark, &buffer.end_iter());
            view.scroll_mark_onscreen(&mark);
        }
    });
    view_scroll_to_end(&text_view, &end_mark);

    let finished_flag = Rc::new(Cell::new(false));
    let on_finished = Rc::new(on_finished);

    let controls_weak = (
        controls.action_btn.downgrade(),
        controls.input.downgrade(),
        controls.progress.as_ref().map(|p| p.downgrade()),
    );
    let flag = finished_flag.clone();
    let callback = on_finished.clone();
    session
        .borrow_mut()
        .connect_state_changed(move |state, exit| {
            if state == SessionState::Finished {
                flag.set(true);
                if let Some(exit) = exit {
                    (*callback)(exit);
                }
            }
            let (Some(action_btn), Some(input)) = (controls_weak.0.upgrade(), controls_weak.1.upgrade())
            else {
                return;
            };
            let controls = Controls {
                action_btn,
                input,
                progress: controls_weak.2.as_ref().and_then(|p| p.upgrade()),
            };
            controls.apply(state);
        });

    let initial_state = session.borrow().state();
    controls.apply(initial_state);
    if initial_state == SessionState::Finished {
        finished_flag.set(true);
        if let Some(exit) = session.borrow().exit() {
            (*on_finished)(exit);
        }
    }

    if let Some(bar) = progress {
        let flag = finished_flag.clone();
        glib::timeout_add_local(Duration::from_millis(120), move || {
            if flag.get() {
                return glib::ControlFlow::Break;
            }
            bar.pulse();
            glib::ControlFlow::Continue
        });
    }

    let session_for_input = session.clone();
    input.connect_activate(move |entry| {
        let text = entry.text().to_string();
        let result = session_for_input.borrow().send_line(&text);
        match result {
            Ok(()) => entry.set_text(""),
            Err(e) => log_warning(&format!("Input not delivered: {}", e)),
        }
    });

    let session_for_btn = session.clone();
    let dialog_weak = dialog.downgrade();
    action_btn.connect_clicked(move |_| {
        let alive = session_for_btn.borrow().is_alive();
        if alive {
            if session_for_btn.borrow_mut().abort() {
                log_info(&format!("Aborted: {}", session_for_btn.borrow().command()));
            }
        } else if let Some(dialog) = dialog_weak.upgrade() {
            dialog.close();
        }
    });

    // Closing the window must not leave an invisible process behind.
    dialog.connect_close_request(move |_| {
        if session.borrow().state() == SessionState::Running {
            session.borrow_mut().abort();
        }
        glib::Propagation::Proceed
    });

    dialog.present();
}

fn view_scroll_to_end(view: &TextView, mark: &gtk4::TextMark) {
    let buffer = view.buffer();
    buffer.move_mark(mark, &buffer.end_iter());
    view.scroll_mark_onscreen(mark);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_offers_abort_until_the_process_exits() {
        let running = look(SessionState::Running);
        assert_eq!(running.label, "Abort");
        assert!(running.button_sensitive && running.input_sensitive);

        let aborted = look(SessionState::Aborted);
        assert_eq!(aborted.label, "Abort");
        assert!(!aborted.button_sensitive);
        assert!(aborted.input_sensitive);
    }

    #[test]
    fn finished_session_can_only_be_closed() {
        assert_eq!(
            look(SessionState::Finished),
            Look {
                label: "Close",
                button_sensitive: true,
                input_sensitive: false,
            }
        );
    }
}
