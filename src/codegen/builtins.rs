//! Runtime ABI name derivation: mechanical mapping from a
//! language-level member/static-call name to the `rt_*` C function the emitted call
//! site invokes. `typeck::builtins` answers "is this call well-typed"; this module
//! answers "what is its C symbol" — the two tables stay independent on purpose so a
//! renamed runtime entry point never has to touch the type checker.

use crate::ast::Type;

/// `indexOf` -> `index_of`, `toUpper` -> `to_upper`. The language's builtin method
/// names are camelCase; the runtime ABI is snake_case C.
pub fn to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i != 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn opaque_type_tag(ty: &Type) -> &'static str {
    match ty {
        Type::TextFile => "textfile",
        Type::BinaryFile => "binaryfile",
        Type::Time => "time",
        Type::Date => "date",
        Type::Process => "process",
        Type::TcpListener => "tcplistener",
        Type::TcpStream => "tcpstream",
        Type::UdpSocket => "udpsocket",
        Type::Random => "random",
        Type::Uuid => "uuid",
        _ => "value",
    }
}

/// Instance method call: `receiver.method(args)` -> `rt_<receiver-tag>_<method>`.
pub fn method_call_name(receiver: &Type, method: &str) -> String {
    let tag = match receiver {
        Type::Array(elem) => format!("array_{}", elem.runtime_suffix()),
        Type::String => "string".to_string(),
        other => opaque_type_tag(other).to_string(),
    };
    format!("rt_{}_{}", tag, to_snake(method))
}

/// Property read: `receiver.name` -> `rt_<receiver-tag>_<name>`. Properties and
/// zero-arg methods share the same ABI shape (a getter call), so this reuses
/// [`method_call_name`].
pub fn property_call_name(receiver: &Type, property: &str) -> String {
    method_call_name(receiver, property)
}

/// Static call: `Type.method(args)` -> `rt_<type_snake>_<method>`.
pub fn static_call_name(type_name: &str, method: &str) -> String {
    format!("rt_{}_{}", to_snake(type_name), to_snake(method))
}

/// Non-native binary operator call (string concatenation, array/struct equality,
/// anything the peephole native-op pass can't fold to a C operator) ->
/// `rt_<op>_<type-suffix>`.
pub fn binary_op_call_name(op_rt_name: &str, operand_suffix: &str) -> String {
    format!("rt_{}_{}", op_rt_name, operand_suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_method_names_become_snake_case() {
        assert_eq!(to_snake("indexOf"), "index_of");
        assert_eq!(to_snake("toUpper"), "to_upper");
        assert_eq!(to_snake("push"), "push");
    }

    #[test]
    fn array_method_name_embeds_element_suffix() {
        assert_eq!(method_call_name(&Type::Array(Box::new(Type::Long)), "push"), "rt_array_long_push");
        assert_eq!(method_call_name(&Type::Array(Box::new(Type::Byte)), "toHex"), "rt_array_byte_to_hex");
    }

    #[test]
    fn static_call_name_snake_cases_both_halves() {
        assert_eq!(static_call_name("TextFile", "open"), "rt_text_file_open");
        assert_eq!(static_call_name("Uuid", "parse"), "rt_uuid_parse");
    }
}
