//! Declarative signature tables for builtin method/property/static-call dispatch:
//! `(type_kind, member_name)` for properties, `(type_kind, method_name)` for
//! instance methods, `(type_name, method_name)` for static calls.
//!
//! Expressed as plain match arms rather than a literal `HashMap`, since the key
//! space is small and fixed and a match gives exhaustiveness checking a table form
//! would not.

use crate::ast::Type;

/// One expected parameter of a builtin call.
#[derive(Clone, Debug)]
pub enum ParamSpec {
    /// Must equal this exact type (after the same numeric promotion call
    /// arguments get in general, see `TypeChecker::types_compatible`).
    Exact(Type),
    /// Must equal the receiver array's element type.
    Elem,
    /// Zero or more trailing arguments, each matching the inner spec.
    Variadic(Box<ParamSpec>),
}

pub struct Sig {
    pub params: Vec<ParamSpec>,
    pub ret: RetSpec,
}

#[derive(Clone, Debug)]
pub enum RetSpec {
    Exact(Type),
    /// Returns the receiver's own array type (in-place mutators reassign the
    /// variable to the runtime function's returned pointer).
    SameArray,
    /// Returns the receiver's element type (`pop`).
    Elem,
}

/// Property lookup: `(receiver type, member name) -> type`.
pub fn member_type(receiver: &Type, name: &str) -> Option<Type> {
    match (receiver, name) {
        (Type::Array(_), "length") => Some(Type::Long),
        (Type::String, "length") => Some(Type::Long),
        (Type::TextFile, "path") | (Type::TextFile, "name") => Some(Type::String),
        (Type::TextFile, "size") => Some(Type::Long),
        (Type::BinaryFile, "path") | (Type::BinaryFile, "name") => Some(Type::String),
        (Type::BinaryFile, "size") => Some(Type::Long),
        (Type::Process, "exit_code") => Some(Type::Int),
        (Type::Process, "stdout") | (Type::Process, "stderr") => Some(Type::String),
        (Type::TcpListener, "port") => Some(Type::Int),
        (Type::TcpStream, "remote_address") => Some(Type::String),
        (Type::UdpSocket, "port") => Some(Type::Int),
        (Type::UdpSocket, "last_sender") => Some(Type::String),
        _ => None,
    }
}

/// Instance method lookup: `(receiver type, method name) -> signature`.
pub fn method_sig(receiver: &Type, name: &str) -> Option<Sig> {
    match receiver {
        Type::Array(elem) => array_method_sig(elem, name),
        Type::String => string_method_sig(name),
        Type::TextFile => text_file_method_sig(name),
        Type::BinaryFile => binary_file_method_sig(name),
        Type::Time => time_method_sig(name),
        Type::Process => process_method_sig(name),
        Type::TcpListener => tcp_listener_method_sig(name),
        Type::TcpStream => tcp_stream_method_sig(name),
        Type::UdpSocket => udp_socket_method_sig(name),
        Type::Random => random_method_sig(name),
        Type::Uuid => uuid_method_sig(name),
        _ => None,
    }
}

fn array_method_sig(elem: &Type, name: &str) -> Option<Sig> {
    let array_ty = Type::Array(Box::new(elem.clone()));
    let sig = match name {
        "push" => Sig {
            params: vec![ParamSpec::Elem],
            ret: RetSpec::SameArray,
        },
        "pop" => Sig {
            params: vec![],
            ret: RetSpec::Elem,
        },
        "clear" => Sig {
            params: vec![],
            ret: RetSpec::SameArray,
        },
        "concat" => Sig {
            params: vec![ParamSpec::Exact(array_ty.clone())],
            ret: RetSpec::SameArray,
        },
        "indexOf" => Sig {
            params: vec![ParamSpec::Elem],
            ret: RetSpec::Exact(Type::Long),
        },
        "contains" => Sig {
            params: vec![ParamSpec::Elem],
            ret: RetSpec::Exact(Type::Bool),
        },
        "clone" => Sig {
            params: vec![],
            ret: RetSpec::SameArray,
        },
        "join" => Sig {
            params: vec![ParamSpec::Exact(Type::String)],
            ret: RetSpec::Exact(Type::String),
        },
        "reverse" => Sig {
            params: vec![],
            ret: RetSpec::SameArray,
        },
        "insert" => Sig {
            params: vec![ParamSpec::Exact(Type::Long), ParamSpec::Elem],
            ret: RetSpec::SameArray,
        },
        "remove" => Sig {
            params: vec![ParamSpec::Exact(Type::Long)],
            ret: RetSpec::SameArray,
        },
        "toString" if *elem == Type::Byte => Sig {
            params: vec![],
            ret: RetSpec::Exact(Type::String),
        },
        "toStringLatin1" if *elem == Type::Byte => Sig {
            params: vec![],
            ret: RetSpec::Exact(Type::String),
        },
        "toHex" if *elem == Type::Byte => Sig {
            params: vec![],
            ret: RetSpec::Exact(Type::String),
        },
        "toBase64" if *elem == Type::Byte => Sig {
            params: vec![],
            ret: RetSpec::Exact(Type::String),
        },
        _ => return None,
    };
    Some(sig)
}

fn string_method_sig(name: &str) -> Option<Sig> {
    let exact = |t: Type| Sig {
        params: vec![],
        ret: RetSpec::Exact(t),
    };
    Some(match name {
        "substring" => Sig {
            params: vec![ParamSpec::Exact(Type::Long), ParamSpec::Exact(Type::Long)],
            ret: RetSpec::Exact(Type::String),
        },
        "indexOf" => Sig {
            params: vec![ParamSpec::Exact(Type::String)],
            ret: RetSpec::Exact(Type::Long),
        },
        "split" => Sig {
            params: vec![ParamSpec::Exact(Type::String)],
            ret: RetSpec::Exact(Type::Array(Box::new(Type::String))),
        },
        "trim" => exact(Type::String),
        "toUpper" => exact(Type::String),
        "toLower" => exact(Type::String),
        "startsWith" => Sig {
            params: vec![ParamSpec::Exact(Type::String)],
            ret: RetSpec::Exact(Type::Bool),
        },
        "endsWith" => Sig {
            params: vec![ParamSpec::Exact(Type::String)],
            ret: RetSpec::Exact(Type::Bool),
        },
        "contains" => Sig {
            params: vec![ParamSpec::Exact(Type::String)],
            ret: RetSpec::Exact(Type::Bool),
        },
        "replace" => Sig {
            params: vec![ParamSpec::Exact(Type::String), ParamSpec::Exact(Type::String)],
            ret: RetSpec::Exact(Type::String),
        },
        "charAt" => Sig {
            params: vec![ParamSpec::Exact(Type::Long)],
            ret: RetSpec::Exact(Type::Char),
        },
        "toBytes" => exact(Type::Array(Box::new(Type::Byte))),
        "splitWhitespace" => exact(Type::Array(Box::new(Type::String))),
        "splitLines" => exact(Type::Array(Box::new(Type::String))),
        "isBlank" => exact(Type::Bool),
        "append" => Sig {
            params: vec![ParamSpec::Exact(Type::String)],
            ret: RetSpec::Exact(Type::String),
        },
        _ => return None,
    })
}

fn text_file_method_sig(name: &str) -> Option<Sig> {
    Some(match name {
        "readLine" => Sig { params: vec![], ret: RetSpec::Exact(Type::String) },
        "readAll" => Sig { params: vec![], ret: RetSpec::Exact(Type::String) },
        "writeLine" => Sig {
            params: vec![ParamSpec::Exact(Type::String)],
            ret: RetSpec::Exact(Type::Void),
        },
        "close" => Sig { params: vec![], ret: RetSpec::Exact(Type::Void) },
        _ => return None,
    })
}

fn binary_file_method_sig(name: &str) -> Option<Sig> {
    Some(match name {
        "read" => Sig {
            params: vec![ParamSpec::Exact(Type::Long)],
            ret: RetSpec::Exact(Type::Array(Box::new(Type::Byte))),
        },
        "write" => Sig {
            params: vec![ParamSpec::Exact(Type::Array(Box::new(Type::Byte)))],
            ret: RetSpec::Exact(Type::Long),
        },
        "close" => Sig { params: vec![], ret: RetSpec::Exact(Type::Void) },
        _ => return None,
    })
}

fn time_method_sig(name: &str) -> Option<Sig> {
    Some(match name {
        "year" | "month" | "day" | "hour" | "minute" | "second" => Sig {
            params: vec![],
            ret: RetSpec::Exact(Type::Int),
        },
        "elapsed" => Sig { params: vec![], ret: RetSpec::Exact(Type::Double) },
        _ => return None,
    })
}

fn process_method_sig(name: &str) -> Option<Sig> {
    Some(match name {
        "wait" => Sig { params: vec![], ret: RetSpec::Exact(Type::Int) },
        _ => return None,
    })
}

fn tcp_listener_method_sig(name: &str) -> Option<Sig> {
    Some(match name {
        "accept" => Sig { params: vec![], ret: RetSpec::Exact(Type::TcpStream) },
        _ => return None,
    })
}

fn tcp_stream_method_sig(name: &str) -> Option<Sig> {
    Some(match name {
        "send" => Sig {
            params: vec![ParamSpec::Exact(Type::String)],
            ret: RetSpec::Exact(Type::Long),
        },
        "receive" => Sig { params: vec![], ret: RetSpec::Exact(Type::String) },
        "close" => Sig { params: vec![], ret: RetSpec::Exact(Type::Void) },
        _ => return None,
    })
}

fn udp_socket_method_sig(name: &str) -> Option<Sig> {
    Some(match name {
        "send" => Sig {
            params: vec![ParamSpec::Exact(Type::String), ParamSpec::Exact(Type::String)],
            ret: RetSpec::Exact(Type::Long),
        },
        "receive" => Sig { params: vec![], ret: RetSpec::Exact(Type::String) },
        _ => return None,
    })
}

fn random_method_sig(name: &str) -> Option<Sig> {
    Some(match name {
        "nextInt" => Sig {
            params: vec![ParamSpec::Exact(Type::Long)],
            ret: RetSpec::Exact(Type::Long),
        },
        "nextDouble" => Sig { params: vec![], ret: RetSpec::Exact(Type::Double) },
        "nextBool" => Sig { params: vec![], ret: RetSpec::Exact(Type::Bool) },
        _ => return None,
    })
}

fn uuid_method_sig(name: &str) -> Option<Sig> {
    Some(match name {
        "toString" => Sig { params: vec![], ret: RetSpec::Exact(Type::String) },
        _ => return None,
    })
}

/// Static-call lookup: `(type name, method name) -> signature`. `type_name` here
/// also covers the pure-namespace receivers (`Path`, `Directory`, `Env`) that never
/// appear as a value type.
pub fn static_method_sig(type_name: &str, method: &str) -> Option<Sig> {
    match (type_name, method) {
        ("TextFile", "open") | ("TextFile", "create") => Some(Sig {
            params: vec![ParamSpec::Exact(Type::String)],
            ret: RetSpec::Exact(Type::TextFile),
        }),
        ("BinaryFile", "open") | ("BinaryFile", "create") => Some(Sig {
            params: vec![ParamSpec::Exact(Type::String)],
            ret: RetSpec::Exact(Type::BinaryFile),
        }),
        ("Time", "now") => Some(Sig { params: vec![], ret: RetSpec::Exact(Type::Time) }),
        ("Date", "today") => Some(Sig { params: vec![], ret: RetSpec::Exact(Type::Date) }),
        ("Path", "join") => Some(Sig {
            params: vec![ParamSpec::Variadic(Box::new(ParamSpec::Exact(Type::String)))],
            ret: RetSpec::Exact(Type::String),
        }),
        ("Directory", "list") => Some(Sig {
            params: vec![ParamSpec::Exact(Type::String)],
            ret: RetSpec::Exact(Type::Array(Box::new(Type::String))),
        }),
        ("Directory", "create") => Some(Sig {
            params: vec![ParamSpec::Exact(Type::String)],
            ret: RetSpec::Exact(Type::Bool),
        }),
        ("Env", "get") => Some(Sig {
            params: vec![ParamSpec::Exact(Type::String)],
            ret: RetSpec::Exact(Type::String),
        }),
        ("Env", "vars") => Some(Sig {
            params: vec![],
            ret: RetSpec::Exact(Type::Array(Box::new(Type::String))),
        }),
        ("Process", "run") => Some(Sig {
            params: vec![ParamSpec::Exact(Type::String)],
            ret: RetSpec::Exact(Type::Process),
        }),
        ("Process", "spawn") => Some(Sig {
            params: vec![
                ParamSpec::Exact(Type::String),
                ParamSpec::Exact(Type::Array(Box::new(Type::String))),
            ],
            ret: RetSpec::Exact(Type::Process),
        }),
        ("Random", "seeded") => Some(Sig {
            params: vec![ParamSpec::Exact(Type::Long)],
            ret: RetSpec::Exact(Type::Random),
        }),
        ("Uuid", "new_v4") => Some(Sig { params: vec![], ret: RetSpec::Exact(Type::Uuid) }),
        ("Uuid", "parse") => Some(Sig {
            params: vec![ParamSpec::Exact(Type::String)],
            ret: RetSpec::Exact(Type::Uuid),
        }),
        ("TcpListener", "bind") => Some(Sig {
            params: vec![ParamSpec::Exact(Type::Int)],
            ret: RetSpec::Exact(Type::TcpListener),
        }),
        ("TcpStream", "connect") => Some(Sig {
            params: vec![ParamSpec::Exact(Type::String), ParamSpec::Exact(Type::Int)],
            ret: RetSpec::Exact(Type::TcpStream),
        }),
        ("UdpSocket", "bind") => Some(Sig {
            params: vec![ParamSpec::Exact(Type::Int)],
            ret: RetSpec::Exact(Type::UdpSocket),
        }),
        _ => None,
    }
}
