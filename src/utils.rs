//! # Utility Functions Module
//!
//! Helper per la costruzione delle argument list passate al codec engine.
//! Ogni operazione dell'engine è descritta come `Vec<String>` (stile argv),
//! quindi qui vivono le utility che evitano catene di `.to_string()`.

/// Builds an argument list from heterogeneous values.
///
/// ```rust
/// use media_batch::args;
///
/// let quality = 80;
/// let argv = args!["-quality", quality, "-compression_level", 6];
/// assert_eq!(argv, vec!["-quality", "80", "-compression_level", "6"]);
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {{
        let argv: Vec<String> = vec![$(($item).to_string()),*];
        argv
    }};
}

/// Renders an argument list the way it would be typed in a shell, for logs.
pub fn format_command(program: &str, args: &[String]) -> String {
    let mut line = String::from(program);
    for arg in args {
        line.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            line.push('"');
            line.push_str(arg);
            line.push('"');
        } else {
            line.push_str(arg);
        }
    }
    line
}
