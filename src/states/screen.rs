use std::collections::HashMap;

use crossbeam_channel::Sender;

use crate::error::{ClientError, Result};
use crate::ui::element::{ElementKind, ElementSpec, EventKind, Events, MouseButton, UiEvent};
use crate::ui::keys;
use crate::ui::layout::{ElementConfig, LayoutDoc};
use crate::ui::{ElementId, Ui, Update};

/// A screen's element subtree, built from its layout file.
pub struct Screen {
    pub root: ElementId,
    pub doc: LayoutDoc,
}

impl Screen {
    /// Load `ui/<name>.kdl` and spawn it under the window.
    pub fn load(
        ui: &mut Ui,
        share_dir: Option<&std::path::Path>,
        name: &str,
        configs: HashMap<String, ElementConfig>,
    ) -> Result<Self> {
        let doc = LayoutDoc::load(share_dir, name)?;
        let root = ui.spawn(ui.root(), doc.generate(configs));
        Ok(Self { root, doc })
    }

    /// The element of `class` within this screen.
    pub fn find(&self, ui: &Ui, class: &str) -> Result<ElementId> {
        ui.tree
            .find_in(self.root, class)
            .ok_or_else(|| ClientError::Layout(format!("layout has no {class:?} element")))
    }

    pub fn show(&self, ui: &mut Ui) {
        ui.tree.apply(self.root, Update::Hidden(false));
    }

    pub fn hide(&self, ui: &mut Ui) {
        ui.tree.blur();
        ui.tree.apply(self.root, Update::Hidden(true));
    }

    pub fn destroy(&self, ui: &mut Ui) {
        ui.tree.destroy(self.root);
    }

    pub fn style_for(&self, class: &str) -> String {
        self.doc.style_for(class).unwrap_or_default().to_string()
    }
}

/// Handlers that forward a left click as `msg`.
pub fn on_press<T: Clone + Send + 'static>(tx: &Sender<T>, msg: T) -> Events {
    let tx = tx.clone();
    Events::new().on(EventKind::Pressed, move |_, ev| match ev {
        UiEvent::Pressed {
            button: MouseButton::Left,
            ..
        } => {
            let _ = tx.try_send(msg.clone());
            false
        }
        _ => true,
    })
}

/// Handlers that forward Return in a focused input as `msg`.
pub fn on_enter<T: Clone + Send + 'static>(tx: &Sender<T>, msg: T) -> Events {
    let tx = tx.clone();
    Events::new().on(EventKind::KeyDown, move |_, ev| match ev {
        UiEvent::KeyDown { code, .. } if *code == keys::RETURN || *code == keys::KP_ENTER => {
            let _ = tx.try_send(msg.clone());
            false
        }
        _ => true,
    })
}

/// Config map with click handlers for each `(class, msg)` pair.
pub fn buttons<T: Clone + Send + 'static>(
    tx: &Sender<T>,
    pairs: impl IntoIterator<Item = (&'static str, T)>,
) -> HashMap<String, ElementConfig> {
    pairs
        .into_iter()
        .map(|(class, msg)| (class.to_string(), ElementConfig::events(on_press(tx, msg))))
        .collect()
}

/// A button naming one entry of a server-provided list.
pub fn entry(class: &str, style: &str, name: &str, events: Events) -> ElementSpec {
    ElementSpec::new(ElementKind::Button)
        .class(class)
        .style(style)
        .value(name)
        .events(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::MonoMeasurer;
    use crossbeam_channel::unbounded;

    #[derive(Debug, Clone, PartialEq)]
    enum Msg {
        Go,
        Submit,
    }

    #[test]
    fn builtin_screen_loads_and_buttons_fire() {
        let mut ui = Ui::new(800.0, 600.0, Box::new(MonoMeasurer::default()));
        let (tx, rx) = unbounded();
        let mut configs = buttons(&tx, [("Submit", Msg::Go)]);
        configs.insert("Password".into(), ElementConfig::events(on_enter(&tx, Msg::Submit)));
        let screen = Screen::load(&mut ui, None, "login", configs).expect("login layout");
        let submit = screen.find(&ui, "Submit").expect("submit");
        assert!(screen.find(&ui, "Nope").is_err());

        ui.tree.fire(
            submit,
            &UiEvent::Pressed {
                button: MouseButton::Left,
                x: 0.0,
                y: 0.0,
            },
        );
        let password = screen.find(&ui, "Password").expect("password");
        ui.tree.focus(password);
        ui.handle_key(keys::KeyEvent::press(keys::RETURN));
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![Msg::Go, Msg::Submit]);

        screen.hide(&mut ui);
        assert!(ui.tree.get(screen.root).is_some_and(|e| e.hidden));
        screen.destroy(&mut ui);
        assert!(!ui.tree.contains(submit));
    }
}
