//! A retained element tree with an input-event dispatcher.
//!
//! A [`Document`] owns every element created through it. Elements are
//! referenced through cheap [`Element`] handles. An element that is not part
//! of any tree is freed, along with its descendants, once its last handle is
//! dropped. Events are routed through the
//! document: listeners registered on the document itself may observe an event
//! in the [`Phase::Capture`] phase, before any listener attached to the target
//! or its ancestors.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use alot::{LotId, Lots};
use kempt::{Map, Set};
use parking_lot::Mutex;

use crate::Error;

/// A tree of elements and the event dispatcher that routes input to them.
#[derive(Clone)]
pub struct Document {
    data: Arc<Mutex<DocumentData>>,
}

impl Document {
    /// Returns a new document containing only a `body` element.
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = Lots::new();
        let body = nodes.push(Node::new("body"));
        Self {
            data: Arc::new(Mutex::new(DocumentData {
                nodes,
                body,
                active: None,
                listeners: Lots::new(),
            })),
        }
    }

    /// Returns the root `body` element.
    #[must_use]
    pub fn body(&self) -> Element {
        let body = self.data.lock().body;
        self.element(body)
    }

    /// Creates a new detached element with the given tag name.
    #[must_use]
    pub fn create_element(&self, tag: impl Into<String>) -> Element {
        let mut node = Node::new(tag);
        node.handles = 1;
        let node = self.data.lock().nodes.push(node);
        Element {
            document: self.clone(),
            node,
        }
    }

    /// Returns the element attached to this document whose id is `id`.
    #[must_use]
    pub fn element_by_id(&self, id: &str) -> Option<Element> {
        let data = self.data.lock();
        let found = data
            .nodes
            .entries()
            .find(|(node, data_node)| {
                data_node.id.as_deref() == Some(id) && data.is_connected(*node)
            })
            .map(|(node, _)| node)?;
        drop(data);
        Some(self.element(found))
    }

    /// Returns the element that currently has input focus.
    #[must_use]
    pub fn active_element(&self) -> Option<Element> {
        let active = self.data.lock().active?;
        Some(self.element(active))
    }

    /// Installs `listener` for events of `kind` anywhere in this document.
    ///
    /// Listeners installed in the [`Phase::Capture`] phase observe an event
    /// before the event's target does. The listener is uninstalled when the
    /// returned handle is dropped.
    pub fn add_event_listener<F>(&self, kind: EventKind, phase: Phase, listener: F) -> ListenerHandle
    where
        F: FnMut(&mut Event) + Send + 'static,
    {
        self.install_listener(kind, ListenerTarget::Document(phase), listener)
    }

    /// Returns true if both handles refer to the same document.
    #[must_use]
    pub fn ptr_eq(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Dispatches an event of `kind` targeting `target` and returns the event
    /// after every listener has observed it.
    ///
    /// No default action is performed. Use the input helpers such as
    /// [`Self::pointer_down`] to also apply the default behavior.
    pub fn dispatch(&self, kind: EventKind, target: &Element) -> Event {
        let mut event = Event {
            kind,
            target: target.clone(),
            default_prevented: false,
            propagation_stopped: false,
        };

        let (capturing, bubbling) = {
            let data = self.data.lock();
            let mut capturing = Vec::new();
            let mut bubbling = Vec::new();
            for (_, listener) in data.listeners.entries() {
                if listener.kind == kind && listener.target == ListenerTarget::Document(Phase::Capture) {
                    capturing.push(listener.clone());
                }
            }

            let mut path = vec![target.node];
            if kind.bubbles() {
                let mut current = target.node;
                while let Some(parent) = data.nodes.get(current).and_then(|node| node.parent) {
                    path.push(parent);
                    current = parent;
                }
            }
            for node in path {
                bubbling.extend(
                    data.listeners
                        .entries()
                        .filter(|(_, listener)| {
                            listener.kind == kind && listener.target == ListenerTarget::Element(node)
                        })
                        .map(|(_, listener)| listener.clone()),
                );
            }
            bubbling.extend(
                data.listeners
                    .entries()
                    .filter(|(_, listener)| {
                        listener.kind == kind
                            && listener.target == ListenerTarget::Document(Phase::Bubble)
                    })
                    .map(|(_, listener)| listener.clone()),
            );
            (capturing, bubbling)
        };

        for listener in capturing {
            if event.propagation_stopped {
                break;
            }
            listener.invoke(&mut event);
        }
        for listener in bubbling {
            if event.propagation_stopped {
                break;
            }
            listener.invoke(&mut event);
        }

        event
    }

    /// Simulates a mouse button being pressed over `target`.
    ///
    /// Unless a listener prevents the default action, the target receives
    /// focus if it is focusable and the focused element is blurred otherwise.
    pub fn pointer_down(&self, target: &Element) -> Event {
        let event = self.dispatch(EventKind::MouseDown, target);
        self.apply_pointer_default(&event);
        event
    }

    /// Simulates a touch starting over `target`. Behaves like
    /// [`Self::pointer_down`].
    pub fn touch_start(&self, target: &Element) -> Event {
        let event = self.dispatch(EventKind::TouchStart, target);
        self.apply_pointer_default(&event);
        event
    }

    /// Simulates a full click on `target`: a pointer-down followed by a
    /// [`EventKind::Click`] event.
    pub fn click(&self, target: &Element) -> Event {
        self.pointer_down(target);
        self.dispatch(EventKind::Click, target)
    }

    /// Simulates the user replacing the contents of the input `target` with
    /// `text`.
    pub fn input_text(&self, target: &Element, text: &str) -> Event {
        target.set_value(text);
        self.dispatch(EventKind::Input, target)
    }

    /// Simulates the submission of the form `target`.
    pub fn submit(&self, target: &Element) -> Event {
        self.dispatch(EventKind::Submit, target)
    }

    /// Moves input focus to `target`, blurring the previously focused element.
    ///
    /// Returns false if `target` cannot receive focus.
    pub fn focus(&self, target: &Element) -> bool {
        if !target.is_focusable() {
            return false;
        }

        let previous = {
            let mut data = self.data.lock();
            if data.active == Some(target.node) {
                return true;
            }
            data.active.replace(target.node)
        };
        if let Some(previous) = previous {
            self.dispatch(EventKind::Blur, &self.element(previous));
        }
        self.dispatch(EventKind::Focus, target);
        true
    }

    /// Removes focus from the focused element, if any.
    pub fn blur(&self) {
        let previous = self.data.lock().active.take();
        if let Some(previous) = previous {
            self.dispatch(EventKind::Blur, &self.element(previous));
        }
    }

    fn apply_pointer_default(&self, event: &Event) {
        if event.default_prevented {
            return;
        }

        if !self.focus(&event.target) {
            self.blur();
        }
    }

    fn install_listener<F>(&self, kind: EventKind, target: ListenerTarget, listener: F) -> ListenerHandle
    where
        F: FnMut(&mut Event) + Send + 'static,
    {
        let listener = Arc::new(Listener {
            kind,
            target,
            active: AtomicBool::new(true),
            callback: Mutex::new(Box::new(listener)),
        });
        let id = self.data.lock().listeners.push(listener.clone());
        ListenerHandle {
            id: Some(id),
            document: Arc::downgrade(&self.data),
            listener,
        }
    }

    /// Returns the number of elements this document holds, including
    /// detached elements that are still referenced.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.data.lock().nodes.len()
    }

    /// Returns the number of listeners currently installed on this document
    /// and its elements.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.data.lock().listeners.len()
    }

    fn element(&self, node: LotId) -> Element {
        self.data.lock().nodes[node].handles += 1;
        Element {
            document: self.clone(),
            node,
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data.lock();
        f.debug_struct("Document")
            .field("elements", &data.nodes.len())
            .field("listeners", &data.listeners.len())
            .finish_non_exhaustive()
    }
}

struct DocumentData {
    nodes: Lots<Node>,
    body: LotId,
    active: Option<LotId>,
    listeners: Lots<Arc<Listener>>,
}

impl DocumentData {
    fn is_connected(&self, mut node: LotId) -> bool {
        loop {
            if node == self.body {
                return true;
            }
            match self.nodes.get(node).and_then(|node| node.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn contains(&self, ancestor: LotId, mut node: LotId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.nodes.get(node).and_then(|node| node.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    /// Frees `node` and every descendant that is not referenced by a handle.
    /// Referenced descendants become detached roots.
    fn free(&mut self, node: LotId) {
        let Some(freed) = self.nodes.remove(node) else {
            return;
        };
        if self.active == Some(node) {
            self.active = None;
        }
        for child in freed.children {
            let Some(child_node) = self.nodes.get_mut(child) else {
                continue;
            };
            child_node.parent = None;
            if child_node.handles == 0 {
                self.free(child);
            }
        }
    }

    fn release(&mut self, node: LotId) {
        let Some(released) = self.nodes.get_mut(node) else {
            return;
        };
        released.handles -= 1;
        if released.handles == 0 && released.parent.is_none() && node != self.body {
            self.free(node);
        }
    }

    fn detach(&mut self, node: LotId) {
        let Some(parent) = self.nodes.get_mut(node).and_then(|node| node.parent.take()) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(parent) {
            parent.children.retain(|child| *child != node);
        }
        if self.active.is_some_and(|active| self.contains(node, active)) {
            self.active = None;
        }
    }
}

struct Node {
    tag: String,
    id: Option<String>,
    attributes: Map<String, String>,
    classes: Set<String>,
    value: String,
    parent: Option<LotId>,
    children: Vec<LotId>,
    handles: usize,
}

impl Node {
    fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            id: None,
            attributes: Map::new(),
            classes: Set::default(),
            value: String::new(),
            parent: None,
            children: Vec::new(),
            handles: 0,
        }
    }
}

/// A handle to an element within a [`Document`].
pub struct Element {
    document: Document,
    node: LotId,
}

impl Clone for Element {
    fn clone(&self) -> Self {
        self.document.element(self.node)
    }
}

impl Drop for Element {
    fn drop(&mut self) {
        self.document.data.lock().release(self.node);
    }
}

impl Element {
    /// Returns the document that owns this element.
    #[must_use]
    pub const fn document(&self) -> &Document {
        &self.document
    }

    fn map<R>(&self, map: impl FnOnce(&Node) -> R) -> R {
        let data = self.document.data.lock();
        map(&data.nodes[self.node])
    }

    fn map_mut<R>(&self, map: impl FnOnce(&mut Node) -> R) -> R {
        let mut data = self.document.data.lock();
        map(&mut data.nodes[self.node])
    }

    /// Returns the tag name of this element.
    #[must_use]
    pub fn tag(&self) -> String {
        self.map(|node| node.tag.clone())
    }

    /// Returns the id of this element.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        self.map(|node| node.id.clone())
    }

    /// Sets the id of this element.
    pub fn set_id(&self, id: impl Into<String>) {
        let id = id.into();
        self.map_mut(|node| node.id = Some(id));
    }

    /// Returns the value of the attribute `name`.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<String> {
        let name = name.to_string();
        self.map(|node| node.attributes.get(&name).cloned())
    }

    /// Sets the attribute `name` to `value`.
    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        self.map_mut(|node| {
            let _previous = node.attributes.insert(name, value);
        });
    }

    /// Adds `class` to this element's class list.
    pub fn add_class(&self, class: impl Into<String>) {
        let class = class.into();
        self.map_mut(|node| {
            let _inserted = node.classes.insert(class);
        });
    }

    /// Removes `class` from this element's class list.
    pub fn remove_class(&self, class: &str) {
        let class = class.to_string();
        self.map_mut(|node| {
            let _removed = node.classes.remove(&class);
        });
    }

    /// Returns true if `class` is in this element's class list.
    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        let class = class.to_string();
        self.map(|node| node.classes.contains(&class))
    }

    /// Returns the current value of this element. Only inputs have a value.
    #[must_use]
    pub fn value(&self) -> String {
        self.map(|node| node.value.clone())
    }

    /// Replaces the value of this element without dispatching any event.
    pub fn set_value(&self, value: impl Into<String>) {
        let value = value.into();
        self.map_mut(|node| node.value = value);
    }

    /// Returns true if this element can receive input focus.
    #[must_use]
    pub fn is_focusable(&self) -> bool {
        self.map(|node| matches!(node.tag.as_str(), "input" | "button" | "textarea"))
    }

    /// Returns the parent of this element.
    #[must_use]
    pub fn parent(&self) -> Option<Element> {
        let parent = self.map(|node| node.parent)?;
        Some(self.document.element(parent))
    }

    /// Returns the children of this element, in order.
    #[must_use]
    pub fn children(&self) -> Vec<Element> {
        self.map(|node| node.children.clone())
            .into_iter()
            .map(|child| self.document.element(child))
            .collect()
    }

    /// Returns true if `other` is this element or one of its descendants.
    #[must_use]
    pub fn contains(&self, other: &Element) -> bool {
        self.document.ptr_eq(&other.document)
            && self.document.data.lock().contains(self.node, other.node)
    }

    /// Returns true if this element is part of its document's tree.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.document.data.lock().is_connected(self.node)
    }

    /// Appends `child` as the last child of this element, first detaching it
    /// from its current parent.
    pub fn append_child(&self, child: &Element) -> crate::Result {
        if !self.document.ptr_eq(&child.document) {
            return Err(Error::ForeignElement);
        }

        let mut data = self.document.data.lock();
        if data.contains(child.node, self.node) {
            return Err(Error::HierarchyRequest);
        }
        data.detach(child.node);
        data.nodes[child.node].parent = Some(self.node);
        data.nodes[self.node].children.push(child.node);
        Ok(())
    }

    /// Removes `child` from this element.
    pub fn remove_child(&self, child: &Element) -> crate::Result {
        if !self.document.ptr_eq(&child.document) {
            return Err(Error::ForeignElement);
        }

        let mut data = self.document.data.lock();
        if data.nodes[child.node].parent != Some(self.node) {
            return Err(Error::NotAChild);
        }
        data.detach(child.node);
        Ok(())
    }

    /// Installs `listener` for events of `kind` targeting this element or, for
    /// events that bubble, any of its descendants.
    pub fn add_event_listener<F>(&self, kind: EventKind, listener: F) -> ListenerHandle
    where
        F: FnMut(&mut Event) + Send + 'static,
    {
        self.document
            .install_listener(kind, ListenerTarget::Element(self.node), listener)
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node && self.document.ptr_eq(&other.document)
    }
}

impl Eq for Element {}

impl Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (tag, id) = self.map(|node| (node.tag.clone(), node.id.clone()));
        let mut debug = f.debug_struct("Element");
        debug.field("tag", &tag);
        if let Some(id) = id {
            debug.field("id", &id);
        }
        debug.finish_non_exhaustive()
    }
}

/// A kind of input or life-cycle event.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum EventKind {
    /// A mouse button was pressed.
    MouseDown,
    /// A touch began.
    TouchStart,
    /// An element was activated.
    Click,
    /// An element received focus.
    Focus,
    /// An element lost focus.
    Blur,
    /// An input's value was edited.
    Input,
    /// A form was submitted.
    Submit,
}

impl EventKind {
    /// Returns true if events of this kind propagate to the target's
    /// ancestors.
    #[must_use]
    pub const fn bubbles(self) -> bool {
        !matches!(self, EventKind::Focus | EventKind::Blur)
    }
}

/// The dispatch phase a document-level listener is invoked in.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Phase {
    /// Before the event reaches its target.
    Capture,
    /// After the target and its ancestors have observed the event.
    Bubble,
}

/// An event being dispatched through a [`Document`].
#[derive(Debug)]
pub struct Event {
    kind: EventKind,
    target: Element,
    default_prevented: bool,
    propagation_stopped: bool,
}

impl Event {
    /// Returns the kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Returns the element this event targets.
    #[must_use]
    pub const fn target(&self) -> &Element {
        &self.target
    }

    /// Prevents the document from applying this event's default action.
    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    /// Returns true if a listener called [`Self::prevent_default`].
    #[must_use]
    pub const fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    /// Prevents any further listeners from observing this event.
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum ListenerTarget {
    Document(Phase),
    Element(LotId),
}

struct Listener {
    kind: EventKind,
    target: ListenerTarget,
    active: AtomicBool,
    callback: Mutex<Box<dyn FnMut(&mut Event) + Send>>,
}

impl Listener {
    fn invoke(&self, event: &mut Event) {
        // Listeners removed earlier in this dispatch must not observe it.
        if !self.active.load(Ordering::Acquire) {
            return;
        }

        if let Some(mut callback) = self.callback.try_lock() {
            callback(event);
        } else {
            tracing::warn!(kind = ?event.kind, "skipping re-entrant event listener");
        }
    }
}

/// A registration of an event listener. When dropped, the listener is
/// uninstalled.
#[must_use = "Listeners are uninstalled once the associated ListenerHandle is dropped."]
pub struct ListenerHandle {
    id: Option<LotId>,
    document: Weak<Mutex<DocumentData>>,
    listener: Arc<Listener>,
}

impl Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("id", &self.id)
            .field("kind", &self.listener.kind)
            .finish_non_exhaustive()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        self.listener.active.store(false, Ordering::Release);
        if let Some(document) = self.document.upgrade() {
            let removed = document.lock().listeners.remove(id);
            drop(removed);
        }
    }
}
