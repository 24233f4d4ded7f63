//! Extraction of class-type references from JVM generic signatures.

/// Collect every class-type name referenced anywhere in a generic signature,
/// in traversal order, nested type arguments included.
///
/// Type-variable references (`TX;`) are skipped. Inner-class segments after
/// `.` are not reported separately; the outer name is enough for the
/// heuristic this feeds (guessing the runtime class behind a generic
/// interface's type parameter).
pub(crate) fn extract_class_types(signature: &str) -> Vec<String> {
    let bytes = signature.as_bytes();
    let mut found = Vec::new();
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'L' => {
                let start = index + 1;
                let mut end = start;
                while end < bytes.len() && !matches!(bytes[end], b';' | b'<' | b'.') {
                    end += 1;
                }
                found.push(signature[start..end].to_string());
                index = end;
            }
            b'T' => {
                // Type-variable reference; skip past its name so identifier
                // characters are not mistaken for new type starts.
                let mut end = index + 1;
                while end < bytes.len() && bytes[end] != b';' {
                    end += 1;
                }
                index = end + 1;
            }
            _ => index += 1,
        }
    }
    found
}
