//! Address-to-source-line resolution through an external `addr2line` helper.
//!
//! The helper is a long-running child process: one hex address per line on
//! its stdin, two lines per response on its stdout (function name, then
//! `file:line`). A failed spawn or a broken pipe disables resolution for the
//! remainder of the session; callstacks then show raw hex addresses.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

#[derive(Debug)]
struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    elf_path: PathBuf,
}

#[derive(Debug, Default)]
pub struct SymbolizerClient {
    toolchain_prefix: String,
    session: Option<Session>,
    disabled: bool,
}

/// One resolved callstack address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLine {
    pub function: Option<String>,
    pub file: PathBuf,
    pub line: u32,
}

impl SymbolizerClient {
    #[must_use]
    pub fn new(toolchain_prefix: &str) -> Self {
        Self { toolchain_prefix: toolchain_prefix.to_owned(), session: None, disabled: false }
    }

    pub fn set_toolchain_prefix(&mut self, prefix: &str) {
        if prefix != self.toolchain_prefix {
            self.toolchain_prefix = prefix.to_owned();
            self.stop();
        }
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Launch the helper for `elf_path`. Idempotent while the ELF is
    /// unchanged; an ELF change stops the old helper and starts a fresh one.
    pub fn start(&mut self, elf_path: &Path) -> bool {
        if self.disabled {
            return false;
        }

        if let Some(session) = &self.session {
            if session.elf_path == elf_path {
                return true;
            }
            self.stop();
        }

        let binary = toolchain_binary(&self.toolchain_prefix, "addr2line");
        let spawned = Command::new(&binary)
            .arg("-e")
            .arg(elf_path)
            .arg("-f")
            .arg("-C")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                log::error!("Failed to spawn '{binary}': {err}; symbol resolution disabled");
                self.disabled = true;
                return false;
            }
        };

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            log::error!("'{binary}' started without the expected pipes; symbol resolution disabled");
            let _ = child.kill();
            let _ = child.wait();
            self.disabled = true;
            return false;
        };

        log::info!("Started '{binary}' for '{}'", elf_path.display());
        self.session = Some(Session {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            elf_path: elf_path.to_path_buf(),
        });
        true
    }

    /// Resolve a code address to its source location. When the first lookup
    /// yields nothing and the address allows it, the lookup is retried at
    /// `addr - 2` to land back inside the call instruction when `addr` is a
    /// return address.
    pub fn resolve(&mut self, addr: u32) -> Option<ResolvedLine> {
        match self.query(addr) {
            Some(resolved) => Some(resolved),
            None if addr >= 2 => self.query(addr - 2),
            None => None,
        }
    }

    fn query(&mut self, addr: u32) -> Option<ResolvedLine> {
        let session = self.session.as_mut()?;

        let request = format!("0x{addr:X}\n");
        if let Err(err) = session.stdin.write_all(request.as_bytes()).and_then(|()| session.stdin.flush())
        {
            log::error!("Symbolizer pipe write failed: {err}; symbol resolution disabled");
            self.fail();
            return None;
        }

        let mut function = String::new();
        let mut location = String::new();
        let read = session
            .stdout
            .read_line(&mut function)
            .and_then(|count| session.stdout.read_line(&mut location).map(|more| count + more));
        match read {
            Ok(0) => {
                log::error!("Symbolizer exited; symbol resolution disabled");
                self.fail();
                return None;
            }
            Ok(_) => {}
            Err(err) => {
                log::error!("Symbolizer pipe read failed: {err}; symbol resolution disabled");
                self.fail();
                return None;
            }
        }

        parse_response(function.trim_end(), location.trim_end())
    }

    fn fail(&mut self) {
        self.stop();
        self.disabled = true;
    }

    /// Close the pipes and reap the child.
    pub fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            drop(session.stdin);
            let _ = session.child.kill();
            let _ = session.child.wait();
        }
    }
}

impl Drop for SymbolizerClient {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Join a toolchain prefix and a tool name, inserting a dash unless the
/// prefix already ends with one. An empty prefix yields the bare tool name.
#[must_use]
pub fn toolchain_binary(prefix: &str, tool: &str) -> String {
    if prefix.is_empty() {
        tool.to_owned()
    } else if prefix.ends_with('-') {
        format!("{prefix}{tool}")
    } else {
        format!("{prefix}-{tool}")
    }
}

fn parse_response(function: &str, location: &str) -> Option<ResolvedLine> {
    let (file, line) = location.rsplit_once(':')?;
    if file.is_empty() || file.starts_with("??") {
        return None;
    }

    // Some helpers append " (discriminator N)" to the line number
    let line: u32 = line.split_whitespace().next()?.parse().ok()?;
    if line == 0 {
        return None;
    }

    let function =
        (!function.is_empty() && function != "??").then(|| function.to_owned());
    Some(ResolvedLine { function, file: PathBuf::from(file), line })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    #[test]
    fn toolchain_prefix_join() {
        assert_eq!(toolchain_binary("", "addr2line"), "addr2line");
        assert_eq!(toolchain_binary("m68k-elf", "addr2line"), "m68k-elf-addr2line");
        assert_eq!(toolchain_binary("m68k-elf-", "addr2line"), "m68k-elf-addr2line");
    }

    #[test]
    fn parses_two_line_responses() {
        assert_eq!(
            parse_response("vblank_handler", "/proj/src/main.c:42"),
            Some(ResolvedLine {
                function: Some("vblank_handler".into()),
                file: "/proj/src/main.c".into(),
                line: 42,
            })
        );
        assert_eq!(
            parse_response("??", "/proj/src/main.c:42"),
            Some(ResolvedLine { function: None, file: "/proj/src/main.c".into(), line: 42 })
        );
        assert_eq!(
            parse_response("f", "/proj/src/main.c:42 (discriminator 3)"),
            Some(ResolvedLine { function: Some("f".into()), file: "/proj/src/main.c".into(), line: 42 })
        );

        assert_eq!(parse_response("??", "??:0"), None);
        assert_eq!(parse_response("??", "??:?"), None);
        assert_eq!(parse_response("f", "no-colon-here"), None);
        assert_eq!(parse_response("f", "/proj/src/main.c:0"), None);
    }

    #[cfg(unix)]
    fn install_fake_helper(name: &str, script: &str) -> (PathBuf, String) {
        use std::os::unix::fs::PermissionsExt;

        let dir = env::temp_dir().join(format!("retroscope-sym-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let binary = dir.join("fake-addr2line");
        fs::write(&binary, script).unwrap();
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();

        let prefix = dir.join("fake").display().to_string();
        (dir, prefix)
    }

    #[cfg(unix)]
    #[test]
    fn resolves_through_child_with_return_address_retry() {
        // The fake helper only knows the address two bytes before 0x1000, so
        // resolving 0x1000 exercises the retry path
        let script = "#!/bin/sh\n\
            while read addr; do\n\
            \tif [ \"$addr\" = \"0xFFE\" ]; then\n\
            \t\techo 'vblank_handler'\n\
            \t\techo '/proj/src/main.c:42'\n\
            \telse\n\
            \t\techo '??'\n\
            \t\techo '??:0'\n\
            \tfi\n\
            done\n";
        let (dir, prefix) = install_fake_helper("retry", script);

        let mut client = SymbolizerClient::new(&prefix);
        assert!(client.start(Path::new("/tmp/game.elf")));
        // Idempotent for the same ELF
        assert!(client.start(Path::new("/tmp/game.elf")));

        let resolved = client.resolve(0x1000).unwrap();
        assert_eq!(resolved.file, PathBuf::from("/proj/src/main.c"));
        assert_eq!(resolved.line, 42);

        assert_eq!(client.resolve(0x2000), None);
        assert!(!client.is_disabled());

        client.stop();
        fs::remove_dir_all(dir).ok();
    }

    #[cfg(unix)]
    #[test]
    fn dead_child_disables_resolution_permanently() {
        let (dir, prefix) = install_fake_helper("dead", "#!/bin/sh\nexit 0\n");

        let mut client = SymbolizerClient::new(&prefix);
        assert!(client.start(Path::new("/tmp/game.elf")));
        assert_eq!(client.resolve(0x1234), None);
        assert!(client.is_disabled());

        // No automatic restart once disabled
        assert!(!client.start(Path::new("/tmp/game.elf")));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn missing_helper_disables_resolution() {
        let mut client = SymbolizerClient::new("/nonexistent/prefix/tool");
        assert!(!client.start(Path::new("/tmp/game.elf")));
        assert!(client.is_disabled());
        assert_eq!(client.resolve(0x1234), None);
    }
}
