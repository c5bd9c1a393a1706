//! Dynamic Value Model
//!
//! Reactive wrapping works over caller-owned structured values whose shape
//! is not known at compile time, so the engine operates on a dynamic `Value`
//! enum. Scalars are stored inline; structured values (records, lists, maps,
//! sets) share their payload behind an `Arc`, so cloning a `Value` aliases
//! the same underlying container rather than copying it.
//!
//! # Identity
//!
//! Every shared container embeds a `TargetId` drawn from an atomic counter.
//! The dependency graph and the identity registries key on these ids, never
//! on pointer addresses, so an id is unique for the lifetime of the process
//! even after the container itself is dropped.
//!
//! # Equality
//!
//! `Value` equality is the engine's change-detection equality, not IEEE
//! float equality: numbers compare same-value-zero (NaN equals NaN, +0
//! equals -0), structured values and engine handles compare by identity,
//! and scalars compare structurally. `Hash` is consistent with `Eq`, which
//! is what lets values act as map keys and set members.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::SystemTime;

use indexmap::{IndexMap, IndexSet};

use crate::observe::Handle;
use crate::reactive::Cell;

/// Unique identifier for a reactive target (container or cell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    /// Generate a new unique target ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize a float for same-value-zero comparison and hashing.
fn canonical_bits(n: f64) -> u64 {
    if n.is_nan() {
        f64::NAN.to_bits()
    } else if n == 0.0 {
        0
    } else {
        n.to_bits()
    }
}

// ----------------------------------------------------------------------------
// Structured containers
// ----------------------------------------------------------------------------

/// A mutable string-keyed record with insertion-ordered fields.
#[derive(Clone)]
pub struct Record(pub(crate) Arc<RecordInner>);

pub(crate) struct RecordInner {
    id: TargetId,
    entries: RwLock<IndexMap<Arc<str>, Value>>,
}

impl Record {
    pub fn new() -> Self {
        Self(Arc::new(RecordInner {
            id: TargetId::new(),
            entries: RwLock::new(IndexMap::new()),
        }))
    }

    pub fn from_entries<K, I>(entries: I) -> Self
    where
        K: Into<Arc<str>>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let record = Self::new();
        {
            let mut guard = record.0.entries.write().expect("record lock poisoned");
            for (key, value) in entries {
                guard.insert(key.into(), value);
            }
        }
        record
    }

    pub fn id(&self) -> TargetId {
        self.0.id
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0
            .entries
            .read()
            .expect("record lock poisoned")
            .get(key)
            .cloned()
    }

    /// Insert a field, returning the previous value if the key existed.
    pub fn insert(&self, key: impl Into<Arc<str>>, value: Value) -> Option<Value> {
        self.0
            .entries
            .write()
            .expect("record lock poisoned")
            .insert(key.into(), value)
    }

    /// Remove a field, preserving the order of the remaining fields.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0
            .entries
            .write()
            .expect("record lock poisoned")
            .shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0
            .entries
            .read()
            .expect("record lock poisoned")
            .contains_key(key)
    }

    pub fn keys(&self) -> Vec<Arc<str>> {
        self.0
            .entries
            .read()
            .expect("record lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.entries.read().expect("record lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.0
            .entries
            .write()
            .expect("record lock poisoned")
            .clear();
    }

    pub(crate) fn downgrade(&self) -> Weak<RecordInner> {
        Arc::downgrade(&self.0)
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record#{}({} fields)", self.id().raw(), self.len())
    }
}

/// A mutable ordered list.
#[derive(Clone)]
pub struct List(pub(crate) Arc<ListInner>);

pub(crate) struct ListInner {
    id: TargetId,
    items: RwLock<Vec<Value>>,
}

impl List {
    pub fn new() -> Self {
        Self(Arc::new(ListInner {
            id: TargetId::new(),
            items: RwLock::new(Vec::new()),
        }))
    }

    pub fn from_items<I: IntoIterator<Item = Value>>(items: I) -> Self {
        let list = Self::new();
        list.0
            .items
            .write()
            .expect("list lock poisoned")
            .extend(items);
        list
    }

    pub fn id(&self) -> TargetId {
        self.0.id
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0
            .items
            .read()
            .expect("list lock poisoned")
            .get(index)
            .cloned()
    }

    /// Replace the item at `index`, returning the previous value.
    /// Out-of-bounds indices leave the list untouched.
    pub fn set(&self, index: usize, value: Value) -> Option<Value> {
        let mut items = self.0.items.write().expect("list lock poisoned");
        let slot = items.get_mut(index)?;
        Some(std::mem::replace(slot, value))
    }

    pub fn push(&self, value: Value) {
        self.0.items.write().expect("list lock poisoned").push(value);
    }

    /// Grow the list with `Null` up to `index`, then push `value` there.
    pub(crate) fn pad_and_push(&self, index: usize, value: Value) {
        let mut items = self.0.items.write().expect("list lock poisoned");
        while items.len() < index {
            items.push(Value::Null);
        }
        items.push(value);
    }

    pub fn remove(&self, index: usize) -> Option<Value> {
        let mut items = self.0.items.write().expect("list lock poisoned");
        if index < items.len() {
            Some(items.remove(index))
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.0.items.read().expect("list lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.0.items.write().expect("list lock poisoned").clear();
    }

    pub fn items(&self) -> Vec<Value> {
        self.0.items.read().expect("list lock poisoned").clone()
    }

    pub(crate) fn downgrade(&self) -> Weak<ListInner> {
        Arc::downgrade(&self.0)
    }
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "list#{}({} items)", self.id().raw(), self.len())
    }
}

/// A mutable value-keyed associative map with insertion-ordered entries.
#[derive(Clone)]
pub struct Map(pub(crate) Arc<MapInner>);

pub(crate) struct MapInner {
    id: TargetId,
    entries: RwLock<IndexMap<Value, Value>>,
}

impl Map {
    pub fn new() -> Self {
        Self(Arc::new(MapInner {
            id: TargetId::new(),
            entries: RwLock::new(IndexMap::new()),
        }))
    }

    pub fn from_entries<I: IntoIterator<Item = (Value, Value)>>(entries: I) -> Self {
        let map = Self::new();
        map.0
            .entries
            .write()
            .expect("map lock poisoned")
            .extend(entries);
        map
    }

    pub fn id(&self) -> TargetId {
        self.0.id
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.0
            .entries
            .read()
            .expect("map lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: Value, value: Value) -> Option<Value> {
        self.0
            .entries
            .write()
            .expect("map lock poisoned")
            .insert(key, value)
    }

    pub fn remove(&self, key: &Value) -> Option<Value> {
        self.0
            .entries
            .write()
            .expect("map lock poisoned")
            .shift_remove(key)
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.0
            .entries
            .read()
            .expect("map lock poisoned")
            .contains_key(key)
    }

    pub fn keys(&self) -> Vec<Value> {
        self.0
            .entries
            .read()
            .expect("map lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.entries.read().expect("map lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.0.entries.write().expect("map lock poisoned").clear();
    }

    pub(crate) fn downgrade(&self) -> Weak<MapInner> {
        Arc::downgrade(&self.0)
    }
}

impl Default for Map {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "map#{}({} entries)", self.id().raw(), self.len())
    }
}

/// A mutable set of values with insertion-ordered members.
#[derive(Clone)]
pub struct Set(pub(crate) Arc<SetInner>);

pub(crate) struct SetInner {
    id: TargetId,
    members: RwLock<IndexSet<Value>>,
}

impl Set {
    pub fn new() -> Self {
        Self(Arc::new(SetInner {
            id: TargetId::new(),
            members: RwLock::new(IndexSet::new()),
        }))
    }

    pub fn from_members<I: IntoIterator<Item = Value>>(members: I) -> Self {
        let set = Self::new();
        set.0
            .members
            .write()
            .expect("set lock poisoned")
            .extend(members);
        set
    }

    pub fn id(&self) -> TargetId {
        self.0.id
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.0
            .members
            .read()
            .expect("set lock poisoned")
            .contains(value)
    }

    /// Add a member. Returns true if the member was not already present.
    pub fn insert(&self, value: Value) -> bool {
        self.0
            .members
            .write()
            .expect("set lock poisoned")
            .insert(value)
    }

    pub fn remove(&self, value: &Value) -> bool {
        self.0
            .members
            .write()
            .expect("set lock poisoned")
            .shift_remove(value)
    }

    pub fn members(&self) -> Vec<Value> {
        self.0
            .members
            .read()
            .expect("set lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.members.read().expect("set lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.0.members.write().expect("set lock poisoned").clear();
    }

    pub(crate) fn downgrade(&self) -> Weak<SetInner> {
        Arc::downgrade(&self.0)
    }
}

impl Default for Set {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "set#{}({} members)", self.id().raw(), self.len())
    }
}

/// Any of the four wrappable container shapes, as one tagged value.
#[derive(Clone, Debug)]
pub enum Structured {
    Record(Record),
    List(List),
    Map(Map),
    Set(Set),
}

impl Structured {
    pub fn id(&self) -> TargetId {
        match self {
            Structured::Record(r) => r.id(),
            Structured::List(l) => l.id(),
            Structured::Map(m) => m.id(),
            Structured::Set(s) => s.id(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Structured::Record(r) => Value::Record(r.clone()),
            Structured::List(l) => Value::List(l.clone()),
            Structured::Map(m) => Value::Map(m.clone()),
            Structured::Set(s) => Value::Set(s.clone()),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Structured::List(_))
    }

    pub(crate) fn downgrade(&self) -> WeakStructured {
        match self {
            Structured::Record(r) => WeakStructured::Record(r.downgrade()),
            Structured::List(l) => WeakStructured::List(l.downgrade()),
            Structured::Map(m) => WeakStructured::Map(m.downgrade()),
            Structured::Set(s) => WeakStructured::Set(s.downgrade()),
        }
    }
}

/// Non-owning reference to a structured container, kept by registries so
/// that dead entries can be swept without extending any value's lifetime.
pub(crate) enum WeakStructured {
    Record(Weak<RecordInner>),
    List(Weak<ListInner>),
    Map(Weak<MapInner>),
    Set(Weak<SetInner>),
}

impl WeakStructured {
    pub(crate) fn is_alive(&self) -> bool {
        match self {
            WeakStructured::Record(w) => w.strong_count() > 0,
            WeakStructured::List(w) => w.strong_count() > 0,
            WeakStructured::Map(w) => w.strong_count() > 0,
            WeakStructured::Set(w) => w.strong_count() > 0,
        }
    }
}

// ----------------------------------------------------------------------------
// Opaque built-ins
// ----------------------------------------------------------------------------

/// A text-pattern handle. The engine never interprets the pattern; it exists
/// so that hosts can pass pattern values through reactive state, and the
/// identity registry treats it as an opaque built-in.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Pattern(Arc<str>);

impl Pattern {
    pub fn new(source: impl Into<Arc<str>>) -> Self {
        Self(source.into())
    }

    pub fn source(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pattern({})", self.0)
    }
}

/// Handle to a computation that has not settled yet. Opaque to the engine.
#[derive(Clone)]
pub struct PendingTask(pub(crate) Arc<PendingInner>);

pub(crate) struct PendingInner {
    id: TargetId,
}

impl PendingTask {
    pub fn new() -> Self {
        Self(Arc::new(PendingInner { id: TargetId::new() }))
    }

    pub fn id(&self) -> TargetId {
        self.0.id
    }
}

impl Default for PendingTask {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PendingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pending#{}", self.0.id.raw())
    }
}

/// A host function value. Functions cannot be wrapped; the variant exists so
/// they can still travel through reactive state.
#[derive(Clone)]
pub struct NativeFn(pub(crate) Arc<NativeFnInner>);

pub(crate) struct NativeFnInner {
    name: Arc<str>,
    f: Box<dyn Fn(&[Value]) -> Value + Send + Sync>,
}

impl NativeFn {
    pub fn new<F>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(NativeFnInner {
            name: name.into(),
            f: Box::new(f),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.0.f)(args)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn({})", self.0.name)
    }
}

// ----------------------------------------------------------------------------
// Value
// ----------------------------------------------------------------------------

/// A dynamically-typed value flowing through the reactive engine.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(Arc<str>),
    /// Interned symbolic constant.
    Atom(Arc<str>),
    /// Date/time built-in; opaque to interception.
    Instant(SystemTime),
    /// Text-pattern built-in; opaque to interception.
    Pattern(Pattern),
    /// In-flight computation handle; opaque to interception.
    Pending(PendingTask),
    Func(NativeFn),
    Record(Record),
    List(List),
    Map(Map),
    Set(Set),
    /// A reactive wrapper over a structured raw value.
    Handle(Handle),
    /// A boxed, field-projection, or derived cell.
    Cell(Cell),
}

impl Value {
    pub fn number(n: f64) -> Self {
        Value::Number(n)
    }

    pub fn text(s: impl Into<Arc<str>>) -> Self {
        Value::Text(s.into())
    }

    pub fn atom(s: impl Into<Arc<str>>) -> Self {
        Value::Atom(s.into())
    }

    pub fn record<K, I>(entries: I) -> Self
    where
        K: Into<Arc<str>>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Record(Record::from_entries(entries))
    }

    pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Self {
        Value::List(List::from_items(items))
    }

    pub fn map<I: IntoIterator<Item = (Value, Value)>>(entries: I) -> Self {
        Value::Map(Map::from_entries(entries))
    }

    pub fn set<I: IntoIterator<Item = Value>>(members: I) -> Self {
        Value::Set(Set::from_members(members))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value is one of the wrappable container shapes.
    pub fn is_structured(&self) -> bool {
        matches!(
            self,
            Value::Record(_) | Value::List(_) | Value::Map(_) | Value::Set(_)
        )
    }

    pub fn as_structured(&self) -> Option<Structured> {
        match self {
            Value::Record(r) => Some(Structured::Record(r.clone())),
            Value::List(l) => Some(Structured::List(l.clone())),
            Value::Map(m) => Some(Structured::Map(m.clone())),
            Value::Set(s) => Some(Structured::Set(s.clone())),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&Handle> {
        match self {
            Value::Handle(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_cell(&self) -> Option<&Cell> {
        match self {
            Value::Cell(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Atom(_) => "atom",
            Value::Instant(_) => "instant",
            Value::Pattern(_) => "pattern",
            Value::Pending(_) => "pending",
            Value::Func(_) => "function",
            Value::Record(_) => "record",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Handle(_) => "handle",
            Value::Cell(_) => "cell",
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => canonical_bits(*a) == canonical_bits(*b),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Atom(a), Value::Atom(b)) => a == b,
            (Value::Instant(a), Value::Instant(b)) => a == b,
            (Value::Pattern(a), Value::Pattern(b)) => a == b,
            (Value::Pending(a), Value::Pending(b)) => Arc::ptr_eq(&a.0, &b.0),
            (Value::Func(a), Value::Func(b)) => Arc::ptr_eq(&a.0, &b.0),
            (Value::Record(a), Value::Record(b)) => a.id() == b.id(),
            (Value::List(a), Value::List(b)) => a.id() == b.id(),
            (Value::Map(a), Value::Map(b)) => a.id() == b.id(),
            (Value::Set(a), Value::Set(b)) => a.id() == b.id(),
            (Value::Handle(a), Value::Handle(b)) => Arc::ptr_eq(&a.0, &b.0),
            (Value::Cell(a), Value::Cell(b)) => Arc::ptr_eq(&a.0, &b.0),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => canonical_bits(*n).hash(state),
            Value::Text(s) => s.hash(state),
            Value::Atom(s) => s.hash(state),
            Value::Instant(t) => t.hash(state),
            Value::Pattern(p) => p.hash(state),
            Value::Pending(p) => p.id().hash(state),
            Value::Func(f) => (Arc::as_ptr(&f.0) as *const () as usize).hash(state),
            Value::Record(r) => r.id().hash(state),
            Value::List(l) => l.id().hash(state),
            Value::Map(m) => m.id().hash(state),
            Value::Set(s) => s.id().hash(state),
            Value::Handle(h) => h.identity_hash(state),
            Value::Cell(c) => c.id().hash(state),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::Atom(s) => write!(f, ":{}", s),
            Value::Instant(t) => write!(f, "instant({:?})", t),
            Value::Pattern(p) => write!(f, "{:?}", p),
            Value::Pending(p) => write!(f, "{:?}", p),
            Value::Func(n) => write!(f, "{:?}", n),
            Value::Record(r) => write!(f, "{:?}", r),
            Value::List(l) => write!(f, "{:?}", l),
            Value::Map(m) => write!(f, "{:?}", m),
            Value::Set(s) => write!(f, "{:?}", s),
            Value::Handle(h) => write!(f, "{:?}", h),
            Value::Cell(c) => write!(f, "{:?}", c),
        }
    }
}
