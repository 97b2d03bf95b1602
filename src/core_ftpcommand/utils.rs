use crate::helpers;
use crate::session::Session;

/// Resolves a single-target command argument against the working
/// directory, and marks the session so the working directory is
/// restored once the command has been handled.
pub fn resolve_child(session: &mut Session, arg: &str) {
    helpers::open_child(&mut session.cwd, arg);
    session.closechild = true;
}

/// Constant-time credential equality: identical length and identical
/// bytes are both required, so a guess sharing a prefix with the
/// expected value is rejected.
pub fn secure_eq(supplied: &str, expected: &str) -> bool {
    let a = supplied.as_bytes();
    let b = expected.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
