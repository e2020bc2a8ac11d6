//! Lexical analysis for the interpreter's command lines.
//!
//! The grammar is deliberately small: a line is a sequence of words separated
//! by whitespace. There is no quoting, escaping, or substitution, so
//! splitting cannot fail and a word always means itself. The background
//! marker `&` is an ordinary word at this level; detecting it (as the final
//! word) is the executor's concern.

/// Split an input line into words.
///
/// Consecutive whitespace collapses and leading/trailing whitespace is
/// ignored, so an empty or all-whitespace line yields no words. Words and
/// line length are unbounded.
pub fn split_words(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_owned).collect()
}
