// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Runtime values and their classes.
//!
//! Every value is `Send + Sync`: immutable payloads sit behind `Arc`, mutable
//! collections and struct fields behind `parking_lot::RwLock`. Equality and
//! hashing follow the host platform's `equals`/`hashCode` contracts, which is
//! what sets and map keys rely on.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use num_bigint::BigInt;
use parking_lot::RwLock;

use crate::chunk::{CodeUnit, UnitFunction};
use crate::vm::RuntimeError;

/// A dynamically-typed Golo value.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Char(char),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    BigInteger(Arc<BigInt>),
    String(Arc<str>),
    Class(TypeKey),
    Function(Arc<FunctionRef>),
    Struct(Arc<StructInstance>),
    Union(Arc<UnionValue>),
    Tuple(im::Vector<Value>),
    Array(Arc<RwLock<Vec<Value>>>),
    List(Arc<RwLock<Vec<Value>>>),
    Vector(Arc<RwLock<Vec<Value>>>),
    Set(Arc<RwLock<IndexSet<Value>>>),
    Map(Arc<RwLock<IndexMap<Value, Value>>>),
    Exception(Arc<ExceptionValue>),
}

impl Value {
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn big(n: BigInt) -> Self {
        Value::BigInteger(Arc::new(n))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(RwLock::new(items)))
    }

    pub fn vector(items: Vec<Value>) -> Self {
        Value::Vector(Arc::new(RwLock::new(items)))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(RwLock::new(items)))
    }

    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Tuple(items.into_iter().collect())
    }

    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Set(Arc::new(RwLock::new(items.into_iter().collect())))
    }

    pub fn map(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Value::Map(Arc::new(RwLock::new(entries.into_iter().collect())))
    }

    pub fn exception(kind: &str, message: impl Into<String>) -> Self {
        Value::Exception(Arc::new(ExceptionValue::new(kind, message)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The runtime class of this value.
    pub fn type_key(&self) -> TypeKey {
        match self {
            Value::Null => TypeKey::Null,
            Value::Bool(_) => TypeKey::Boolean,
            Value::Char(_) => TypeKey::Character,
            Value::Integer(_) => TypeKey::Integer,
            Value::Long(_) => TypeKey::Long,
            Value::Float(_) => TypeKey::Float,
            Value::Double(_) => TypeKey::Double,
            Value::BigInteger(_) => TypeKey::BigInteger,
            Value::String(_) => TypeKey::String,
            Value::Class(_) => TypeKey::Class,
            Value::Function(_) => TypeKey::FunctionReference,
            Value::Struct(s) => TypeKey::Struct(s.ty.name.clone()),
            Value::Union(u) => TypeKey::UnionValue(u.variant.name.clone()),
            Value::Tuple(_) => TypeKey::Tuple,
            Value::Array(_) => TypeKey::Array,
            Value::List(_) => TypeKey::List,
            Value::Vector(_) => TypeKey::Vector,
            Value::Set(_) => TypeKey::Set,
            Value::Map(_) => TypeKey::Map,
            Value::Exception(_) => TypeKey::Exception,
        }
    }

    /// Name of the runtime class, for error messages.
    pub fn type_name(&self) -> String {
        self.type_key().name().to_string()
    }

    /// Snapshot the elements of a sequence-like value.
    pub fn elements(&self) -> Option<Vec<Value>> {
        match self {
            Value::Tuple(items) => Some(items.iter().cloned().collect()),
            Value::Array(items) | Value::List(items) | Value::Vector(items) => {
                Some(items.read().clone())
            }
            Value::Set(items) => Some(items.read().iter().cloned().collect()),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

// ============================================================================
// Classes
// ============================================================================

/// The runtime class of a value.
///
/// User-defined types are identified by their fully-qualified names:
/// `<module>.types.<Struct>`, `<module>.types.<Union>` and
/// `<module>.types.<Union>.<Variant>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKey {
    Null,
    Object,
    Number,
    Boolean,
    Character,
    Integer,
    Long,
    Float,
    Double,
    BigInteger,
    String,
    Class,
    FunctionReference,
    Tuple,
    Array,
    List,
    Vector,
    Set,
    Map,
    Exception,
    /// Common supertype of all structs.
    GoloStruct,
    Struct(Arc<str>),
    Union(Arc<str>),
    UnionValue(Arc<str>),
}

const BUILTIN_NAMES: &[(&str, TypeKey)] = &[
    ("Object", TypeKey::Object),
    ("java.lang.Object", TypeKey::Object),
    ("Number", TypeKey::Number),
    ("java.lang.Number", TypeKey::Number),
    ("Boolean", TypeKey::Boolean),
    ("java.lang.Boolean", TypeKey::Boolean),
    ("Character", TypeKey::Character),
    ("java.lang.Character", TypeKey::Character),
    ("Integer", TypeKey::Integer),
    ("java.lang.Integer", TypeKey::Integer),
    ("Long", TypeKey::Long),
    ("java.lang.Long", TypeKey::Long),
    ("Float", TypeKey::Float),
    ("java.lang.Float", TypeKey::Float),
    ("Double", TypeKey::Double),
    ("java.lang.Double", TypeKey::Double),
    ("BigInteger", TypeKey::BigInteger),
    ("java.math.BigInteger", TypeKey::BigInteger),
    ("String", TypeKey::String),
    ("java.lang.String", TypeKey::String),
    ("Class", TypeKey::Class),
    ("java.lang.Class", TypeKey::Class),
    ("FunctionReference", TypeKey::FunctionReference),
    ("gololang.FunctionReference", TypeKey::FunctionReference),
    ("Tuple", TypeKey::Tuple),
    ("gololang.Tuple", TypeKey::Tuple),
    ("Array", TypeKey::Array),
    ("Object[]", TypeKey::Array),
    ("List", TypeKey::List),
    ("java.util.List", TypeKey::List),
    ("LinkedList", TypeKey::List),
    ("java.util.LinkedList", TypeKey::List),
    ("Vector", TypeKey::Vector),
    ("ArrayList", TypeKey::Vector),
    ("java.util.ArrayList", TypeKey::Vector),
    ("Set", TypeKey::Set),
    ("java.util.Set", TypeKey::Set),
    ("Map", TypeKey::Map),
    ("java.util.Map", TypeKey::Map),
    ("Exception", TypeKey::Exception),
    ("Throwable", TypeKey::Exception),
    ("RuntimeException", TypeKey::Exception),
    ("java.lang.Exception", TypeKey::Exception),
    ("java.lang.Throwable", TypeKey::Exception),
    ("java.lang.RuntimeException", TypeKey::Exception),
    ("GoloStruct", TypeKey::GoloStruct),
    ("gololang.GoloStruct", TypeKey::GoloStruct),
];

impl TypeKey {
    /// Look up a built-in class by simple or qualified name.
    pub fn builtin(name: &str) -> Option<TypeKey> {
        BUILTIN_NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, key)| key.clone())
    }

    pub fn name(&self) -> &str {
        match self {
            TypeKey::Null => "null",
            TypeKey::Object => "Object",
            TypeKey::Number => "Number",
            TypeKey::Boolean => "Boolean",
            TypeKey::Character => "Character",
            TypeKey::Integer => "Integer",
            TypeKey::Long => "Long",
            TypeKey::Float => "Float",
            TypeKey::Double => "Double",
            TypeKey::BigInteger => "BigInteger",
            TypeKey::String => "String",
            TypeKey::Class => "Class",
            TypeKey::FunctionReference => "FunctionReference",
            TypeKey::Tuple => "Tuple",
            TypeKey::Array => "Array",
            TypeKey::List => "List",
            TypeKey::Vector => "Vector",
            TypeKey::Set => "Set",
            TypeKey::Map => "Map",
            TypeKey::Exception => "Exception",
            TypeKey::GoloStruct => "GoloStruct",
            TypeKey::Struct(name) | TypeKey::Union(name) | TypeKey::UnionValue(name) => name,
        }
    }

    /// The name with dots replaced, as used in augmentation unit names.
    pub fn mangled_name(&self) -> String {
        self.name().replace('.', "$")
    }

    /// This class followed by all of its supertypes, most specific first.
    pub fn supertypes(&self) -> Vec<TypeKey> {
        let mut types = vec![self.clone()];
        match self {
            TypeKey::Null | TypeKey::Object => return types,
            TypeKey::Integer
            | TypeKey::Long
            | TypeKey::Float
            | TypeKey::Double
            | TypeKey::BigInteger => types.push(TypeKey::Number),
            TypeKey::Vector => types.push(TypeKey::List),
            TypeKey::Struct(_) => types.push(TypeKey::GoloStruct),
            TypeKey::UnionValue(name) => {
                if let Some((parent, _)) = name.rsplit_once('.') {
                    types.push(TypeKey::Union(parent.into()));
                }
            }
            _ => {}
        }
        types.push(TypeKey::Object);
        types
    }

    /// Whether a value of this class may be used where `target` is expected.
    pub fn is_assignable_to(&self, target: &TypeKey) -> bool {
        if self == target {
            return true;
        }
        if *self == TypeKey::Null {
            return false;
        }
        self.supertypes().iter().any(|t| t == target)
    }

    pub fn is_number(&self) -> bool {
        self.is_assignable_to(&TypeKey::Number)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Functions
// ============================================================================

/// A first-class reference to a function, possibly with leading arguments
/// already bound.
pub struct FunctionRef {
    pub unit: Arc<CodeUnit>,
    pub index: usize,
    pub bound: Vec<Value>,
}

impl FunctionRef {
    pub fn new(unit: Arc<CodeUnit>, index: usize) -> Self {
        FunctionRef {
            unit,
            index,
            bound: Vec::new(),
        }
    }

    pub fn function(&self) -> Option<&UnitFunction> {
        self.unit.functions.get(self.index).map(|f| f.as_ref())
    }

    pub fn name(&self) -> &str {
        self.function().map(|f| f.name.as_str()).unwrap_or("?")
    }

    /// Arity still expected from callers once bound arguments are applied.
    pub fn arity(&self) -> usize {
        self.function()
            .map(|f| f.arity.saturating_sub(self.bound.len()))
            .unwrap_or(0)
    }

    pub fn is_varargs(&self) -> bool {
        self.function().is_some_and(|f| f.varargs)
    }

    /// A new reference with `values` appended to the bound arguments.
    pub fn bind(&self, values: impl IntoIterator<Item = Value>) -> FunctionRef {
        let mut bound = self.bound.clone();
        bound.extend(values);
        FunctionRef {
            unit: Arc::clone(&self.unit),
            index: self.index,
            bound,
        }
    }
}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FunctionReference{{{}::{}, arity={}}}",
            self.unit.name,
            self.name(),
            self.arity()
        )
    }
}

// ============================================================================
// Structs and unions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructType {
    /// Fully-qualified name, `<module>.types.<Name>`.
    pub name: Arc<str>,
    pub simple_name: String,
    pub members: Vec<String>,
}

impl StructType {
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m == name)
    }
}

#[derive(Debug)]
pub struct StructInstance {
    pub ty: Arc<StructType>,
    pub fields: RwLock<Vec<Value>>,
    pub frozen: bool,
}

impl StructInstance {
    pub fn new(ty: Arc<StructType>, fields: Vec<Value>, frozen: bool) -> Self {
        StructInstance {
            ty,
            fields: RwLock::new(fields),
            frozen,
        }
    }

    pub fn get(&self, index: usize) -> Value {
        self.fields.read().get(index).cloned().unwrap_or_default()
    }

    pub fn set(&self, index: usize, value: Value) -> Result<(), RuntimeError> {
        if self.frozen {
            return Err(RuntimeError::FrozenStruct(self.ty.simple_name.clone()));
        }
        match self.fields.write().get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(RuntimeError::Internal(format!(
                "no field #{} in struct {}",
                index, self.ty.name
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnionVariant {
    /// Fully-qualified name, `<module>.types.<Union>.<Variant>`.
    pub name: Arc<str>,
    pub union_name: Arc<str>,
    pub simple_name: String,
    pub members: Vec<String>,
    /// Simple names of every variant of the enclosing union.
    pub siblings: Arc<[String]>,
}

impl UnionVariant {
    /// `Union.Variant`, as shown to users.
    pub fn display_name(&self) -> String {
        let union = self.union_name.rsplit('.').next().unwrap_or("");
        format!("{}.{}", union, self.simple_name)
    }

    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m == name)
    }
}

/// An immutable instance of a union variant.
#[derive(Debug)]
pub struct UnionValue {
    pub variant: Arc<UnionVariant>,
    pub fields: Vec<Value>,
}

// ============================================================================
// Exceptions
// ============================================================================

/// A thrown or caught exception.
#[derive(Debug)]
pub struct ExceptionValue {
    /// Exception class name, e.g. `RuntimeException`.
    pub kind: String,
    pub message: String,
    /// The runtime fault this exception was created from, if any.
    pub source: Option<Box<RuntimeError>>,
}

impl ExceptionValue {
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        ExceptionValue {
            kind: kind.to_string(),
            message: message.into(),
            source: None,
        }
    }
}

// ============================================================================
// Display (toString)
// ============================================================================

fn write_items<'a>(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    items: impl Iterator<Item = &'a Value>,
    close: &str,
) -> fmt::Result {
    write!(f, "{}", open)?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, "{}", close)
}

/// Format a floating point number the way the host platform does:
/// always with a fractional part, exponent form outside `[1e-3, 1e7)`.
pub fn format_double(x: f64) -> String {
    if x.is_nan() {
        return "NaN".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }
    let magnitude = x.abs();
    if (1e-3..1e7).contains(&magnitude) {
        let s = format!("{}", x);
        if s.contains('.') { s } else { format!("{}.0", s) }
    } else {
        let s = format!("{:e}", x);
        match s.split_once('e') {
            Some((mantissa, exponent)) if mantissa.contains('.') => {
                format!("{}E{}", mantissa, exponent)
            }
            Some((mantissa, exponent)) => format!("{}.0E{}", mantissa, exponent),
            None => s,
        }
    }
}

pub fn format_float(x: f32) -> String {
    if x.is_finite() && x != 0.0 && (1e-3..1e7).contains(&x.abs()) {
        let s = format!("{}", x);
        if s.contains('.') { s } else { format!("{}.0", s) }
    } else {
        format_double(x as f64)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Char(c) => write!(f, "{}", c),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Long(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", format_float(*n)),
            Value::Double(n) => write!(f, "{}", format_double(*n)),
            Value::BigInteger(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Class(key) => write!(f, "class {}", key.name()),
            Value::Function(func) => write!(f, "{:?}", func),
            Value::Struct(s) => {
                write!(f, "struct {}{{", s.ty.simple_name)?;
                let fields = s.fields.read();
                for (i, (name, value)) in s.ty.members.iter().zip(fields.iter()).enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", name, value)?;
                }
                write!(f, "}}")
            }
            Value::Union(u) => {
                write!(f, "{}", u.variant.display_name())?;
                if u.variant.members.is_empty() {
                    return Ok(());
                }
                write!(f, "{{")?;
                for (i, (name, value)) in u.variant.members.iter().zip(&u.fields).enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", name, value)?;
                }
                write!(f, "}}")
            }
            Value::Tuple(items) => write_items(f, "tuple[", items.iter(), "]"),
            Value::Array(items) => write_items(f, "array[", items.read().iter(), "]"),
            Value::List(items) | Value::Vector(items) => {
                write_items(f, "[", items.read().iter(), "]")
            }
            Value::Set(items) => write_items(f, "[", items.read().iter(), "]"),
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.read().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Exception(e) => write!(f, "{}: {}", e.kind, e.message),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Char(c) => write!(f, "{:?}", c),
            other => write!(f, "{}", other),
        }
    }
}

// ============================================================================
// Equality and hashing
// ============================================================================

fn same_double(a: f64, b: f64) -> bool {
    a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
}

fn double_bits(x: f64) -> u64 {
    if x.is_nan() { f64::NAN.to_bits() } else { x.to_bits() }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => same_double(*a as f64, *b as f64),
            (Value::Double(a), Value::Double(b)) => same_double(*a, *b),
            (Value::BigInteger(a), Value::BigInteger(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Struct(a), Value::Struct(b)) => {
                Arc::ptr_eq(a, b) || (a.ty == b.ty && *a.fields.read() == *b.fields.read())
            }
            (Value::Union(a), Value::Union(b)) => {
                Arc::ptr_eq(a, b) || (a.variant.name == b.variant.name && a.fields == b.fields)
            }
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::List(a) | Value::Vector(a), Value::List(b) | Value::Vector(b)) => {
                Arc::ptr_eq(a, b) || *a.read() == *b.read()
            }
            (Value::Set(a), Value::Set(b)) => Arc::ptr_eq(a, b) || *a.read() == *b.read(),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b) || *a.read() == *b.read(),
            (Value::Exception(a), Value::Exception(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Char(c) => c.hash(state),
            Value::Integer(n) => n.hash(state),
            Value::Long(n) => n.hash(state),
            Value::Float(n) => double_bits(*n as f64).hash(state),
            Value::Double(n) => double_bits(*n).hash(state),
            Value::BigInteger(n) => n.hash(state),
            Value::String(s) => s.hash(state),
            Value::Class(key) => key.hash(state),
            Value::Function(f) => (Arc::as_ptr(f) as usize).hash(state),
            Value::Struct(s) => {
                s.ty.name.hash(state);
                s.fields.read().hash(state);
            }
            Value::Union(u) => {
                u.variant.name.hash(state);
                u.fields.hash(state);
            }
            Value::Tuple(items) => {
                for item in items {
                    item.hash(state);
                }
            }
            Value::Array(a) => (Arc::as_ptr(a) as usize).hash(state),
            Value::List(items) | Value::Vector(items) => items.read().hash(state),
            Value::Set(items) => {
                // Order-insensitive, like the equality above.
                let mut sum: u64 = 0;
                for item in items.read().iter() {
                    sum = sum.wrapping_add(hash_code(item) as u64);
                }
                sum.hash(state);
            }
            Value::Map(entries) => {
                let mut sum: u64 = 0;
                for (k, v) in entries.read().iter() {
                    sum = sum.wrapping_add((hash_code(k) ^ hash_code(v)) as u64);
                }
                sum.hash(state);
            }
            Value::Exception(e) => (Arc::as_ptr(e) as usize).hash(state),
        }
    }
}

/// A 32-bit hash code consistent with equality, exposed as `hashCode()`.
pub fn hash_code(value: &Value) -> i32 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.hash(&mut hasher);
    let h = hasher.finish();
    (h ^ (h >> 32)) as i32
}
