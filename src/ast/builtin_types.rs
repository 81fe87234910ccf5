//! Name table for primitive/opaque built-in type spellings, shared by the parser
//! (to resolve a type annotation's identifier) and the type checker (to resolve a
//! static-call receiver's identifier to the type it names).

use crate::ast::Type;

const NAMED_TYPES: &[(&str, fn() -> Type)] = &[
    ("int", || Type::Int),
    ("long", || Type::Long),
    ("int32", || Type::Int32),
    ("uint", || Type::UInt),
    ("uint32", || Type::UInt32),
    ("float", || Type::Float),
    ("double", || Type::Double),
    ("bool", || Type::Bool),
    ("byte", || Type::Byte),
    ("char", || Type::Char),
    ("string", || Type::String),
    ("void", || Type::Void),
    ("any", || Type::Any),
    ("TextFile", || Type::TextFile),
    ("BinaryFile", || Type::BinaryFile),
    ("Time", || Type::Time),
    ("Date", || Type::Date),
    ("Process", || Type::Process),
    ("TcpListener", || Type::TcpListener),
    ("TcpStream", || Type::TcpStream),
    ("UdpSocket", || Type::UdpSocket),
    ("Random", || Type::Random),
    ("Uuid", || Type::Uuid),
];

/// Resolves a bare identifier to the [`Type`] it names, if any. Used by the parser
/// for type annotations and by the type checker for static-call receivers
/// (`Type.method(...)`) and `is`/`as` right-hand sides.
pub fn lookup(name: &str) -> Option<Type> {
    NAMED_TYPES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, make)| make())
}

/// Static-call receiver names with no associated value type (pure namespaces, e.g.
/// `Path.join(...)`, `Directory.list(...)`). These never appear as a variable's type.
pub const NAMESPACE_RECEIVERS: &[&str] = &["Path", "Directory", "Env", "Array"];

pub fn is_known_type_name(name: &str) -> bool {
    lookup(name).is_some()
}

pub fn is_known_static_receiver(name: &str) -> bool {
    is_known_type_name(name) || NAMESPACE_RECEIVERS.contains(&name)
}
