// src/script.rs

//! Splitting a `set -e` script into individually executed statements
//!
//! This is a line-oriented heuristic, not a shell parser. It understands
//! heredocs, backslash continuations and trailing pipe/`&&`/`||` operators.
//! Quoting, subshells and backgrounded `&` statements are not recognized.

/// Split a script into statements
///
/// Blank lines, comments and `set -e` are dropped unless they sit inside a
/// statement that is still being built (heredoc bodies, continuations).
pub fn decompose(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut heredoc: Option<String> = None;

    for line in script.split('\n') {
        let stripped = line.trim();

        if let Some(delimiter) = &heredoc {
            current.push(line);
            if stripped == delimiter || stripped.ends_with(delimiter.as_str()) {
                heredoc = None;
                flush(&mut current, &mut statements);
            }
            continue;
        }

        if stripped.is_empty() || stripped.starts_with('#') {
            if !current.is_empty() {
                current.push(line);
            }
            continue;
        }

        if stripped == "set -e" {
            continue;
        }

        if let Some(delimiter) = heredoc_delimiter(line) {
            current.push(line);
            heredoc = Some(delimiter);
            continue;
        }

        current.push(line);

        if line.ends_with('\\') {
            continue;
        }

        if is_statement_end(stripped) {
            flush(&mut current, &mut statements);
        }
    }

    flush(&mut current, &mut statements);
    statements
}

/// Delimiter of a heredoc opened on this line, if any
///
/// `<<<` here-strings do not open a heredoc.
pub fn heredoc_delimiter(line: &str) -> Option<String> {
    let idx = line.rfind("<<")?;
    if idx > 0 && line.as_bytes()[idx - 1] == b'<' {
        return None;
    }

    let rest = line[idx + 2..].trim_start().trim_start_matches('-');
    let word = rest.split_whitespace().next()?;
    let delimiter = word.trim_matches(|c| c == '\'' || c == '"');
    if delimiter.is_empty() {
        None
    } else {
        Some(delimiter.to_string())
    }
}

fn is_statement_end(stripped: &str) -> bool {
    if stripped.ends_with(';') {
        return true;
    }
    !(stripped.ends_with('\\')
        || stripped.ends_with('|')
        || stripped.ends_with("&&")
        || stripped.ends_with("||"))
}

fn flush(current: &mut Vec<&str>, statements: &mut Vec<String>) {
    if current.is_empty() {
        return;
    }
    let text = current.join("\n").trim().to_string();
    if !text.is_empty() && !text.starts_with('#') {
        statements.push(text);
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_lines() {
        let script = "set -e\n# install\nsudo apt-get update\n\nsudo apt-get install -y nginx\n";
        assert_eq!(
            decompose(script),
            vec!["sudo apt-get update", "sudo apt-get install -y nginx"]
        );
    }

    #[test]
    fn test_heredoc_kept_intact() {
        let script = "set -e\ncat > /tmp/site.conf << 'EOF'\nserver {\n    # not a statement\n    listen 80;\n}\nEOF\nsudo nginx -t";
        let stmts = decompose(script);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].starts_with("cat > /tmp/site.conf << 'EOF'"));
        assert!(stmts[0].contains("listen 80;"));
        assert!(stmts[0].contains("# not a statement"));
        assert!(stmts[0].ends_with("EOF"));
        assert_eq!(stmts[1], "sudo nginx -t");
    }

    #[test]
    fn test_line_continuation_joined() {
        let script = "sudo apt-get install -y \\\n    curl \\\n    wget\necho done";
        let stmts = decompose(script);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "sudo apt-get install -y \\\n    curl \\\n    wget");
    }

    #[test]
    fn test_trailing_operators_continue_statement() {
        let script = "curl -fsSL https://example.com/setup.sh |\nsudo bash\nsystemctl is-active nginx &&\necho up ||\necho down";
        let stmts = decompose(script);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "curl -fsSL https://example.com/setup.sh |\nsudo bash");
        assert_eq!(stmts[1], "systemctl is-active nginx &&\necho up ||\necho down");
    }

    #[test]
    fn test_here_string_is_not_heredoc() {
        assert_eq!(heredoc_delimiter("grep x <<< \"$VAR\""), None);
        assert_eq!(heredoc_delimiter("cat <<-END > f"), Some("END".to_string()));
        assert_eq!(heredoc_delimiter("sudo tee f << \"CONF\""), Some("CONF".to_string()));
        assert_eq!(decompose("grep x <<< \"$VAR\"\nls"), vec!["grep x <<< \"$VAR\"", "ls"]);
    }

    #[test]
    fn test_only_comments_and_directive() {
        assert!(decompose("set -e\n# nothing\n\n").is_empty());
        assert!(decompose("").is_empty());
    }
}
