//! Generic sentinel-delimited managed-block primitive shared by the SSH
//! config editor and the gitconfig editor.
//!
//! Grounded in `bridge::ssh_config::SshConfigBridge`'s line-oriented,
//! preserve-unmanaged-region parsing, generalized from that teacher's
//! single-line `# hyperforge: <org>` marker to this spec's paired
//! `# BEGIN RemoteJuggler <ver>` / `# END RemoteJuggler` sentinels so a
//! single contiguous block (rather than interleaved per-org stanzas) is
//! replaced wholesale on every rewrite.

use crate::error::{Result, SshConfigError};
use std::path::Path;

pub const SENTINEL_PREFIX: &str = "# BEGIN RemoteJuggler";
pub const SENTINEL_END: &str = "# END RemoteJuggler";

fn begin_line(version: u32) -> String {
    format!("{SENTINEL_PREFIX} {version}")
}

/// Finds the managed block in `lines`, returning `(begin_idx, end_idx)`
/// inclusive of the sentinel lines themselves.
fn find_block(lines: &[String], path: &Path) -> Result<Option<(usize, usize)>> {
    let begin_idx = lines.iter().position(|l| l.trim_start().starts_with(SENTINEL_PREFIX));
    let Some(begin_idx) = begin_idx else {
        return Ok(None);
    };
    let end_idx = lines[begin_idx..]
        .iter()
        .position(|l| l.trim() == SENTINEL_END)
        .map(|offset| begin_idx + offset);

    match end_idx {
        Some(end_idx) => Ok(Some((begin_idx, end_idx))),
        None => Err(SshConfigError::CorruptManagedBlock { path: path.to_path_buf() }.into()),
    }
}

/// Replaces (or appends) the managed block in `content` with `body` under
/// sentinels tagged with `version`. `body` is the block's inner lines only
/// (sentinels are added by this function). Content outside the block is
/// byte-preserved.
pub fn rewrite(content: &str, path: &Path, version: u32, body: &[String]) -> Result<String> {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let had_trailing_newline = content.is_empty() || content.ends_with('\n');

    let mut new_block = vec![begin_line(version)];
    new_block.extend(body.iter().cloned());
    new_block.push(SENTINEL_END.to_string());

    match find_block(&lines, path)? {
        Some((begin, end)) => {
            lines.splice(begin..=end, new_block);
        }
        None => {
            if !lines.is_empty() && !lines.last().unwrap().is_empty() {
                lines.push(String::new());
            }
            lines.extend(new_block);
        }
    }

    let mut out = lines.join("\n");
    if had_trailing_newline || !out.is_empty() {
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn p() -> PathBuf {
        PathBuf::from("/tmp/test-config")
    }

    #[test]
    fn appends_when_absent() {
        let content = "Host other\n    HostName example.com\n";
        let out = rewrite(content, &p(), 1, &["Host mine".to_string()]).unwrap();
        assert!(out.starts_with("Host other\n    HostName example.com\n\n# BEGIN RemoteJuggler 1\nHost mine\n# END RemoteJuggler\n"));
    }

    #[test]
    fn replaces_existing_block_preserving_surroundings() {
        let content = "before\n# BEGIN RemoteJuggler 1\nold content\n# END RemoteJuggler\nafter\n";
        let out = rewrite(content, &p(), 2, &["new content".to_string()]).unwrap();
        assert_eq!(out, "before\n# BEGIN RemoteJuggler 2\nnew content\n# END RemoteJuggler\nafter\n");
    }

    #[test]
    fn idempotent_on_unchanged_body() {
        let content = "x\n# BEGIN RemoteJuggler 1\nsame\n# END RemoteJuggler\ny\n";
        let once = rewrite(content, &p(), 1, &["same".to_string()]).unwrap();
        let twice = rewrite(&once, &p(), 1, &["same".to_string()]).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn corrupt_block_without_end_sentinel_errors() {
        let content = "# BEGIN RemoteJuggler 1\nno end here\n";
        let result = rewrite(content, &p(), 1, &["x".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn stale_version_tag_is_rewritten() {
        let content = "# BEGIN RemoteJuggler 1\nold\n# END RemoteJuggler\n";
        let out = rewrite(content, &p(), 2, &["old".to_string()]).unwrap();
        assert!(out.contains("# BEGIN RemoteJuggler 2"));
        assert!(!out.contains("# BEGIN RemoteJuggler 1"));
    }
}
