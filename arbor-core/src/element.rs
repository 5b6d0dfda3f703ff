//! Element Descriptions
//!
//! An element description is an immutable value describing what should exist
//! on screen for one render pass. There are three kinds:
//!
//! - `Text`: a primitive value already reduced to its string form
//! - `Host`: a native tag plus a property mapping
//! - `Component`: a render function plus a property mapping
//!
//! Descriptions are produced fresh on every pass. The live counterpart of a
//! description is a render node (see `tree`), which is where component hook
//! storage lives.
//!
//! # Children and emptiness
//!
//! Children are elements, primitive values, or nested lists. Lists are
//! flattened in place. Primitive values that are "empty" (`null`, `false`,
//! the empty string, NaN) render nothing but still occupy a position, so that
//! conditional children keep their siblings' indices stable. Numeric zero is
//! rendered as `"0"`.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::hooks::HookContext;
use crate::target::{Event, EventHandler};

/// A component render function.
///
/// Component identity is the function's address: two descriptions refer to
/// the same component when they carry the same function.
pub type RenderFn = fn(&mut HookContext<'_>, &Props) -> Child;

/// A property or child value.
///
/// Equality is strict equality: primitives compare by value (so NaN is never
/// equal to itself), strings by content, handlers and opaque values by
/// pointer identity.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Handler(EventHandler),
    /// Any other shared value, compared by identity.
    Opaque(Rc<dyn Any>),
}

impl Value {
    /// Wrap an arbitrary value, compared by identity.
    pub fn opaque<T: Any>(value: T) -> Self {
        Self::Opaque(Rc::new(value))
    }

    /// Wrap an event handler.
    pub fn handler<F>(handler: F) -> Self
    where
        F: Fn(&Event) -> crate::Result<()> + 'static,
    {
        Self::Handler(EventHandler::new(handler))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_handler(&self) -> Option<&EventHandler> {
        match self {
            Self::Handler(h) => Some(h),
            _ => None,
        }
    }

    /// Borrow an opaque value as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Opaque(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// The string form of a primitive, regardless of emptiness.
    ///
    /// Handlers, opaque values and `Null` have no string form.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(n) => Some(n.to_string()),
            Self::Float(f) => Some(format_float(*f)),
            Self::Str(s) => Some(s.to_string()),
            Self::Null | Self::Handler(_) | Self::Opaque(_) => None,
        }
    }

    /// The text this value renders as a child, or `None` when it renders
    /// nothing.
    pub fn render_text(&self) -> Option<String> {
        let renders = match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(_) => true,
            Self::Float(f) => !f.is_nan(),
            Self::Str(s) => !s.is_empty(),
            Self::Handler(_) | Self::Opaque(_) => false,
        };
        if renders {
            self.to_text()
        } else {
            None
        }
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        let text = if f > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if f == 0.0 {
        // covers negative zero
        "0".to_string()
    } else {
        format!("{f}")
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Handler(a), Self::Handler(b)) => a == b,
            (Self::Opaque(a), Self::Opaque(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Int(n) => write!(f, "Int({n})"),
            Self::Float(x) => write!(f, "Float({x})"),
            Self::Str(s) => write!(f, "Str({s:?})"),
            Self::Handler(h) => write!(f, "{h:?}"),
            Self::Opaque(value) => write!(f, "Opaque({:p})", Rc::as_ptr(value)),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(Rc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(Rc::from(value))
    }
}

impl From<Rc<str>> for Value {
    fn from(value: Rc<str>) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<EventHandler> for Value {
    fn from(value: EventHandler) -> Self {
        Self::Handler(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A child of a host element or the output of a render function.
#[derive(Clone, Debug)]
pub enum Child {
    Element(Element),
    Value(Value),
    List(Vec<Child>),
}

impl Child {
    /// A child that renders nothing.
    pub fn empty() -> Self {
        Self::Value(Value::Null)
    }
}

impl From<Element> for Child {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

impl From<Option<Element>> for Child {
    fn from(element: Option<Element>) -> Self {
        element.map_or_else(Self::empty, Self::Element)
    }
}

impl From<Value> for Child {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Vec<Child>> for Child {
    fn from(children: Vec<Child>) -> Self {
        Self::List(children)
    }
}

impl From<Vec<Element>> for Child {
    fn from(elements: Vec<Element>) -> Self {
        Self::List(elements.into_iter().map(Self::Element).collect())
    }
}

impl From<&str> for Child {
    fn from(value: &str) -> Self {
        Self::Value(value.into())
    }
}

impl From<String> for Child {
    fn from(value: String) -> Self {
        Self::Value(value.into())
    }
}

impl From<bool> for Child {
    fn from(value: bool) -> Self {
        Self::Value(value.into())
    }
}

impl From<i64> for Child {
    fn from(value: i64) -> Self {
        Self::Value(value.into())
    }
}

impl From<i32> for Child {
    fn from(value: i32) -> Self {
        Self::Value(value.into())
    }
}

impl From<f64> for Child {
    fn from(value: f64) -> Self {
        Self::Value(value.into())
    }
}

/// Flatten children into positional slots.
///
/// Each slot is either an element to instantiate or `None` for a child that
/// renders nothing.
pub(crate) fn normalize_children(children: &[Child]) -> Vec<Option<Element>> {
    let mut slots = Vec::with_capacity(children.len());
    flatten_into(children, &mut slots);
    slots
}

fn flatten_into(children: &[Child], slots: &mut Vec<Option<Element>>) {
    for child in children {
        match child {
            Child::List(nested) => flatten_into(nested, slots),
            Child::Element(element) => slots.push(Some(element.clone())),
            Child::Value(value) => slots.push(value.render_text().map(Element::Text)),
        }
    }
}

/// A property mapping: ordered named values plus the `children` slot.
#[derive(Clone, Default, Debug)]
pub struct Props {
    values: IndexMap<String, Value>,
    children: Vec<Child>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Builder-style event handler, e.g. `on("onClick", ..)`.
    pub fn on<F>(self, key: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Event) -> crate::Result<()> + 'static,
    {
        self.with(key, Value::handler(handler))
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Iterate over named values in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn children(&self) -> &[Child] {
        &self.children
    }

    pub fn set_children(&mut self, children: Vec<Child>) {
        self.children = children;
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_int)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Borrow an opaque property as `T`.
    pub fn opaque<T: Any>(&self, key: &str) -> Option<&T> {
        self.get(key).and_then(Value::downcast_ref::<T>)
    }
}

/// A native tag with its properties.
#[derive(Clone, Debug)]
pub struct HostElement {
    pub(crate) tag: String,
    pub(crate) props: Props,
}

impl HostElement {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn props(&self) -> &Props {
        &self.props
    }
}

/// A component render function with its properties.
#[derive(Clone)]
pub struct ComponentElement {
    pub(crate) render: RenderFn,
    pub(crate) props: Props,
}

impl ComponentElement {
    pub fn render_fn(&self) -> RenderFn {
        self.render
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    /// Whether both descriptions refer to the same render function.
    pub fn same_component(&self, other: &ComponentElement) -> bool {
        std::ptr::fn_addr_eq(self.render, other.render)
    }
}

impl fmt::Debug for ComponentElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentElement")
            .field("render", &(self.render as *const ()))
            .field("props", &self.props)
            .finish()
    }
}

/// An immutable description of intended UI content.
#[derive(Clone, Debug)]
pub enum Element {
    Text(String),
    Host(HostElement),
    Component(ComponentElement),
}

impl Element {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Short label for logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Host(_) => "host",
            Self::Component(_) => "component",
        }
    }

    pub fn props(&self) -> Option<&Props> {
        match self {
            Self::Text(_) => None,
            Self::Host(host) => Some(&host.props),
            Self::Component(component) => Some(&component.props),
        }
    }
}

/// The first argument of [`describe`]: a native tag or a render function.
#[derive(Clone)]
pub enum ElementType {
    Tag(String),
    Component(RenderFn),
}

impl From<&str> for ElementType {
    fn from(tag: &str) -> Self {
        Self::Tag(tag.to_string())
    }
}

impl From<String> for ElementType {
    fn from(tag: String) -> Self {
        Self::Tag(tag)
    }
}

impl From<RenderFn> for ElementType {
    fn from(render: RenderFn) -> Self {
        Self::Component(render)
    }
}

/// Build an element description.
///
/// A tag yields a host description, a render function a component
/// description. `children` lands in the property mapping's children slot.
pub fn describe(kind: impl Into<ElementType>, mut props: Props, children: Vec<Child>) -> Element {
    props.set_children(children);
    match kind.into() {
        ElementType::Tag(tag) => Element::Host(HostElement { tag, props }),
        ElementType::Component(render) => Element::Component(ComponentElement { render, props }),
    }
}

/// Shorthand for a host description.
pub fn host(tag: impl Into<String>, props: Props, children: Vec<Child>) -> Element {
    describe(ElementType::Tag(tag.into()), props, children)
}

/// Shorthand for a component description.
pub fn component(render: RenderFn, props: Props, children: Vec<Child>) -> Element {
    describe(ElementType::Component(render), props, children)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_cx: &mut HookContext<'_>, _props: &Props) -> Child {
        Child::empty()
    }

    fn other(_cx: &mut HookContext<'_>, props: &Props) -> Child {
        Child::List(props.children().to_vec())
    }

    #[test]
    fn describe_classifies_tags_and_components() {
        let div = describe("div", Props::new().with("id", "main"), vec!["hi".into()]);
        match &div {
            Element::Host(host) => {
                assert_eq!(host.tag(), "div");
                assert_eq!(host.props().str("id"), Some("main"));
                assert_eq!(host.props().children().len(), 1);
            }
            other => panic!("expected host, got {other:?}"),
        }

        let comp = describe(noop as RenderFn, Props::new(), vec![]);
        assert_eq!(comp.kind_name(), "component");
    }

    #[test]
    fn component_identity_is_the_render_function() {
        let a = component(noop, Props::new(), vec![]);
        let b = component(noop, Props::new().with("x", 1), vec![]);
        let c = component(other, Props::new(), vec![]);
        let (Element::Component(a), Element::Component(b), Element::Component(c)) = (a, b, c) else {
            panic!("expected components");
        };
        assert!(a.same_component(&b));
        assert!(!a.same_component(&c));
    }

    #[test]
    fn strict_equality() {
        assert_eq!(Value::from("a"), Value::from(String::from("a")));
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Float(f64::NAN), Value::Float(f64::NAN));

        let handler = EventHandler::new(|_| Ok(()));
        assert_eq!(Value::Handler(handler.clone()), Value::Handler(handler));
        assert_ne!(Value::handler(|_| Ok(())), Value::handler(|_| Ok(())));

        let shared = Value::opaque(5_u8);
        assert_eq!(shared.clone(), shared);
        assert_ne!(Value::opaque(5_u8), Value::opaque(5_u8));
    }

    #[test]
    fn emptiness_rule() {
        assert_eq!(Value::Int(0).render_text().as_deref(), Some("0"));
        assert_eq!(Value::Float(-0.0).render_text().as_deref(), Some("0"));
        assert_eq!(Value::Float(2.5).render_text().as_deref(), Some("2.5"));
        assert_eq!(Value::Bool(true).render_text().as_deref(), Some("true"));
        assert_eq!(Value::Bool(false).render_text(), None);
        assert_eq!(Value::Null.render_text(), None);
        assert_eq!(Value::from("").render_text(), None);
        assert_eq!(Value::Float(f64::NAN).render_text(), None);
        assert_eq!(Value::opaque(1_u8).render_text(), None);
    }

    #[test]
    fn normalize_flattens_and_keeps_empty_positions() {
        let children: Vec<Child> = vec![
            "a".into(),
            Child::List(vec![0.into(), false.into(), Child::List(vec!["b".into()])]),
            Child::empty(),
            host("span", Props::new(), vec![]).into(),
        ];
        let slots = normalize_children(&children);
        assert_eq!(slots.len(), 6);
        assert!(matches!(&slots[0], Some(Element::Text(t)) if t == "a"));
        assert!(matches!(&slots[1], Some(Element::Text(t)) if t == "0"));
        assert!(slots[2].is_none());
        assert!(matches!(&slots[3], Some(Element::Text(t)) if t == "b"));
        assert!(slots[4].is_none());
        assert!(matches!(&slots[5], Some(Element::Host(h)) if h.tag() == "span"));
    }

    #[test]
    fn props_typed_accessors() {
        let props = Props::new()
            .with("count", 3)
            .with("label", "x")
            .with("flag", true)
            .with("shared", Value::opaque(vec![1, 2]));
        assert_eq!(props.int("count"), Some(3));
        assert_eq!(props.str("label"), Some("x"));
        assert_eq!(props.bool("flag"), Some(true));
        assert_eq!(props.opaque::<Vec<i32>>("shared"), Some(&vec![1, 2]));
        assert_eq!(props.opaque::<String>("shared"), None);
        let keys: Vec<_> = props.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["count", "label", "flag", "shared"]);
    }
}
