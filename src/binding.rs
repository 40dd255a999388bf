//! Two-way bindings between elements and [`Dynamic`] values.

use std::fmt::{self, Debug};

use crate::document::{Element, Event, EventKind, ListenerHandle};
use crate::value::{CallbackHandle, Dynamic};

/// A set of bindings that keep elements and values synchronized.
///
/// Every callback and listener a binding installs is owned by this set.
/// Dropping the set, or calling [`Bindings::clean`], detaches all of them.
#[derive(Default)]
#[must_use = "Bindings are detached once the Bindings value is dropped."]
pub struct Bindings {
    callbacks: CallbackHandle,
    listeners: Vec<ListenerHandle>,
}

impl Bindings {
    /// Returns an empty set of bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the contents of the input `element` and `text` synchronized.
    ///
    /// Each edit of the input is written to `text`, and each change of `text`
    /// is written to the input.
    pub fn value(&mut self, element: &Element, text: &Dynamic<String>) -> &mut Self {
        element.set_value(text.get());
        self.callbacks += text.for_each({
            let element = element.clone();
            move |text| {
                if element.value() != *text {
                    element.set_value(text.clone());
                }
            }
        });
        self.listeners.push(element.add_event_listener(EventKind::Input, {
            let text = text.clone();
            move |event| text.set(event.target().value())
        }));
        self
    }

    /// Keeps the focus state of `element` and `focused` synchronized.
    pub fn has_focus(&mut self, element: &Element, focused: &Dynamic<bool>) -> &mut Self {
        let document = element.document().clone();
        if focused.get() {
            document.focus(element);
        }
        self.callbacks += focused.for_each({
            let element = element.clone();
            move |focused| {
                let is_active = document.active_element().as_ref() == Some(&element);
                if *focused && !is_active {
                    document.focus(&element);
                } else if !*focused && is_active {
                    document.blur();
                }
            }
        });
        self.listeners.push(element.add_event_listener(EventKind::Focus, {
            let focused = focused.clone();
            move |_| focused.set(true)
        }));
        self.listeners.push(element.add_event_listener(EventKind::Blur, {
            let focused = focused.clone();
            move |_| focused.set(false)
        }));
        self
    }

    /// Adds `class` to `element` while `condition` returns true for the
    /// contents of `value`.
    pub fn class_when<T, F>(
        &mut self,
        element: &Element,
        class: &'static str,
        value: &Dynamic<T>,
        condition: F,
    ) -> &mut Self
    where
        T: Send + 'static,
        F: Fn(&T) -> bool + Send + 'static,
    {
        let apply = {
            let element = element.clone();
            move |value: &T| {
                if condition(value) {
                    element.add_class(class);
                } else {
                    element.remove_class(class);
                }
            }
        };
        value.map_ref(&apply);
        self.callbacks += value.for_each(apply);
        self
    }

    /// Invokes `listener` for each event of `kind` dispatched to `element` or
    /// its descendants.
    pub fn on<F>(&mut self, element: &Element, kind: EventKind, listener: F) -> &mut Self
    where
        F: FnMut(&mut Event) + Send + 'static,
    {
        self.listeners.push(element.add_event_listener(kind, listener));
        self
    }

    /// Invokes `on_submit` each time the form `element` is submitted.
    pub fn submit<F>(&mut self, element: &Element, mut on_submit: F) -> &mut Self
    where
        F: FnMut() + Send + 'static,
    {
        self.on(element, EventKind::Submit, move |event| {
            event.prevent_default();
            on_submit();
        })
    }

    /// Invokes `on_click` each time `element` is clicked.
    pub fn click<F>(&mut self, element: &Element, mut on_click: F) -> &mut Self
    where
        F: FnMut() + Send + 'static,
    {
        self.on(element, EventKind::Click, move |_| on_click())
    }

    /// Detaches every binding in this set.
    pub fn clean(&mut self) {
        self.callbacks = CallbackHandle::default();
        self.listeners.clear();
    }
}

impl Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bindings")
            .field("callbacks", &self.callbacks)
            .field("listeners", &self.listeners)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::Bindings;
    use crate::document::Document;
    use crate::value::Dynamic;

    #[test]
    fn value_binding_is_two_way() {
        let document = Document::new();
        let input = document.create_element("input");
        document.body().append_child(&input).unwrap();
        let text = Dynamic::new(String::from("Paris"));

        let mut bindings = Bindings::new();
        bindings.value(&input, &text);
        assert_eq!(input.value(), "Paris");

        document.input_text(&input, "Tokyo");
        assert_eq!(text.get(), "Tokyo");

        text.set(String::from("Lima"));
        assert_eq!(input.value(), "Lima");

        bindings.clean();
        text.set(String::from("Oslo"));
        assert_eq!(input.value(), "Lima");
        document.input_text(&input, "Cairo");
        assert_eq!(text.get(), "Oslo");
    }

    #[test]
    fn focus_binding_follows_document_focus() {
        let document = Document::new();
        let input = document.create_element("input");
        let canvas = document.create_element("canvas");
        document.body().append_child(&input).unwrap();
        document.body().append_child(&canvas).unwrap();
        let focused = Dynamic::new(false);

        let mut bindings = Bindings::new();
        bindings.has_focus(&input, &focused);

        document.pointer_down(&input);
        assert!(focused.get());
        document.pointer_down(&canvas);
        assert!(!focused.get());

        focused.set(true);
        assert_eq!(document.active_element(), Some(input.clone()));
        focused.set(false);
        assert_eq!(document.active_element(), None);
    }

    #[test]
    fn class_follows_condition() {
        let document = Document::new();
        let input = document.create_element("input");
        let text = Dynamic::new(String::new());

        let mut bindings = Bindings::new();
        bindings.class_when(&input, "wide", &text, |text: &String| !text.is_empty());
        assert!(!input.has_class("wide"));
        text.set(String::from("Rome"));
        assert!(input.has_class("wide"));
        text.set(String::new());
        assert!(!input.has_class("wide"));

        bindings.clean();
        text.set(String::from("Rome"));
        assert!(!input.has_class("wide"));
    }

    #[test]
    fn submit_prevents_default() {
        let document = Document::new();
        let form = document.create_element("form");
        let submitted = Arc::new(AtomicUsize::new(0));

        let mut bindings = Bindings::new();
        bindings.submit(&form, {
            let submitted = submitted.clone();
            move || {
                submitted.fetch_add(1, Ordering::Relaxed);
            }
        });

        let event = document.submit(&form);
        assert!(event.default_prevented());
        assert_eq!(submitted.load(Ordering::Relaxed), 1);

        drop(bindings);
        document.submit(&form);
        assert_eq!(submitted.load(Ordering::Relaxed), 1);
    }
}
