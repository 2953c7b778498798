//! Android media sessions via `dumpsys media_session`.
//!
//! Works on a rooted device (through `su`) and inside a WayDroid container
//! (through `waydroid shell`). Both produce the same text dump, parsed by
//! [`parse_media_session`].

use std::io::{self, Read};
use std::process::{Command, Output, Stdio};
use std::sync::LazyLock;
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::debug;

use nowplaying_core::{Adapter, AdapterError, PlaybackStatus, RawCandidate};

use crate::filter::SourceFilter;
use crate::source_db::SourceDatabase;

/// How far past the session header we look for its metadata.
const SESSION_WINDOW: usize = 3000;

/// Upper bound for any shell call. A pending root-grant prompt or a wedged
/// container would otherwise hang the poll.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
const WAIT_STEP: Duration = Duration::from_millis(20);

// android.media.session.PlaybackState constants.
const STATE_STOPPED: u32 = 1;
const STATE_PAUSED: u32 = 2;
const STATE_PLAYING: u32 = 3;

static RE_BUTTON_SESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Media button session is (\S+)").unwrap());
static RE_PRIORITY_SESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"global priority session is (\S+)").unwrap());
static RE_ANY_SESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Media session (\S+)").unwrap());

static RE_PLAYBACK_STATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"state=PlaybackState\s*\{([^}]*)\}").unwrap());
static RE_STATE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|,\s*)state=(\d+)").unwrap());
static RE_POSITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|,\s*)position=(-?\d+)").unwrap());
static RE_DESCRIPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"description=([^\r\n]+)").unwrap());

static RE_TITLE: LazyLock<Regex> = LazyLock::new(|| metadata_regex("TITLE"));
static RE_ARTIST: LazyLock<Regex> = LazyLock::new(|| metadata_regex("ARTIST"));
static RE_ALBUM: LazyLock<Regex> = LazyLock::new(|| metadata_regex("ALBUM"));
static RE_DURATION: LazyLock<Regex> = LazyLock::new(|| metadata_regex("DURATION"));

fn metadata_regex(key: &str) -> Regex {
    Regex::new(&format!(r"(?i)android\.media\.metadata\.{key}:\s*([^\r\n]+)")).unwrap()
}

/// Where the dump comes from. Decides the shell command and the source suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpsysFlavor {
    Android,
    Waydroid,
}

/// Parse the active media session out of a `dumpsys media_session` dump.
///
/// Returns `None` when there is no session, or the session has neither a
/// title nor an artist.
pub fn parse_media_session(
    output: &str,
    db: &SourceDatabase,
    flavor: DumpsysFlavor,
) -> Option<RawCandidate> {
    let active = active_session(output)?;
    // "com.amazon.mp3/MediaSessionController (userId=0)" -> "com.amazon.mp3"
    let package = active.split('/').next().unwrap_or(active);
    let section = session_section(output, active, package);

    let mut title = capture(&RE_TITLE, section);
    let mut artist = capture(&RE_ARTIST, section);
    let mut album = capture(&RE_ALBUM, section);
    let duration_ms = capture(&RE_DURATION, section).parse::<i64>().ok();

    let mut status = PlaybackStatus::Unknown;
    let mut position_ms = None;
    if let Some(block) = RE_PLAYBACK_STATE.captures(section).and_then(|c| c.get(1)) {
        let block = block.as_str();
        status = match RE_STATE_CODE
            .captures(block)
            .and_then(|c| c[1].parse::<u32>().ok())
        {
            Some(STATE_PLAYING) => PlaybackStatus::Playing,
            Some(STATE_PAUSED) => PlaybackStatus::Paused,
            Some(STATE_STOPPED) => PlaybackStatus::Stopped,
            _ => PlaybackStatus::Unknown,
        };
        position_ms = RE_POSITION
            .captures(block)
            .and_then(|c| c[1].parse::<i64>().ok());
    }

    // Newer releases only print "description=title, artist, album".
    if title.is_empty() {
        if let Some(desc) = RE_DESCRIPTION.captures(section).map(|c| c[1].trim().to_string()) {
            let mut parts = desc.split(',').map(|p| non_null(p.trim()));
            title = parts.next().unwrap_or_default();
            if artist.is_empty() {
                artist = parts.next().unwrap_or_default();
            } else {
                parts.next();
            }
            if album.is_empty() {
                album = parts.next().unwrap_or_default();
            }
            if artist.is_empty() {
                if let Some((t, a)) = title.split_once(" - ") {
                    let (t, a) = (t.trim().to_string(), a.trim().to_string());
                    title = t;
                    artist = a;
                }
            }
        }
    }

    if title.is_empty() && artist.is_empty() {
        return None;
    }

    let app_name = match db.find_by_package(package) {
        Some(def) => def.name.clone(),
        None => package_display_name(package),
    };
    let source = match flavor {
        DumpsysFlavor::Android => app_name,
        DumpsysFlavor::Waydroid => format!("{app_name} (WayDroid)"),
    };

    let mut candidate = RawCandidate::new(source)
        .title(title)
        .artist(artist)
        .album(album)
        .status(status);
    candidate.duration_ms = duration_ms;
    candidate.position_ms = position_ms;
    Some(candidate)
}

/// Package name of the active session, as reported by the dump.
pub fn active_package(output: &str) -> Option<&str> {
    active_session(output).map(|s| s.split('/').next().unwrap_or(s))
}

fn active_session(output: &str) -> Option<&str> {
    [&*RE_BUTTON_SESSION, &*RE_PRIORITY_SESSION, &*RE_ANY_SESSION]
        .into_iter()
        .find_map(|re| re.captures(output).and_then(|c| c.get(1)))
        .map(|m| m.as_str())
}

fn session_section<'a>(output: &'a str, active: &str, package: &str) -> &'a str {
    let Some(start) = output.find(active).or_else(|| output.find(package)) else {
        return output;
    };
    let mut end = (start + SESSION_WINDOW).min(output.len());
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    &output[start..end]
}

fn capture(re: &Regex, text: &str) -> String {
    re.captures(text)
        .map(|c| non_null(c[1].trim()))
        .unwrap_or_default()
}

fn non_null(value: &str) -> String {
    if value.eq_ignore_ascii_case("null") {
        String::new()
    } else {
        value.to_string()
    }
}

/// "com.example.my_player" -> "My Player".
fn package_display_name(package: &str) -> String {
    let last = package.rsplit('.').next().unwrap_or(package);
    last.replace('_', " ")
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Polls `dumpsys media_session` through a privileged shell.
pub struct DumpsysAdapter {
    flavor: DumpsysFlavor,
    db: SourceDatabase,
    filter: SourceFilter,
    /// Program plus leading arguments; `dumpsys media_session` is appended.
    shell: Vec<String>,
}

impl DumpsysAdapter {
    /// Rooted Android device. Probes for a working `su` invocation.
    pub fn android(db: SourceDatabase, filter: SourceFilter) -> Self {
        Self {
            flavor: DumpsysFlavor::Android,
            db,
            filter,
            shell: detect_su(),
        }
    }

    /// WayDroid container on a Linux host.
    pub fn waydroid(db: SourceDatabase, filter: SourceFilter) -> Self {
        Self {
            flavor: DumpsysFlavor::Waydroid,
            db,
            filter,
            shell: ["sudo", "-n", "waydroid", "shell"]
                .map(String::from)
                .to_vec(),
        }
    }

    fn run_dumpsys(&self) -> Result<String, AdapterError> {
        let (program, args) = self
            .shell
            .split_first()
            .ok_or_else(|| AdapterError::Unavailable("no shell configured".into()))?;

        let mut command = Command::new(program);
        command.args(args);
        match self.flavor {
            // `su -c` takes the whole command line as one argument.
            DumpsysFlavor::Android => command.arg("dumpsys media_session"),
            DumpsysFlavor::Waydroid => command.args(["dumpsys", "media_session"]),
        };

        let output = output_with_timeout(&mut command, COMMAND_TIMEOUT).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => AdapterError::Unavailable(format!("{program} not found")),
            io::ErrorKind::TimedOut => AdapterError::Unavailable(format!("{program}: {e}")),
            _ => AdapterError::Io(e),
        })?;

        if !output.status.success() && output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdapterError::PermissionDenied(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Adapter for DumpsysAdapter {
    fn name(&self) -> &str {
        match self.flavor {
            DumpsysFlavor::Android => "android",
            DumpsysFlavor::Waydroid => "waydroid",
        }
    }

    fn poll(&mut self) -> Result<Vec<RawCandidate>, AdapterError> {
        // The container can be started after we are.
        if self.flavor == DumpsysFlavor::Waydroid && !waydroid_running() {
            return Err(AdapterError::Unavailable("WayDroid session is not running".into()));
        }

        let output = self.run_dumpsys()?;
        let Some(candidate) = parse_media_session(&output, &self.db, self.flavor) else {
            return Ok(Vec::new());
        };

        if let Some(package) = active_package(&output) {
            if !self.filter.allows(package, self.db.find_by_package(package)) {
                debug!(package, "Filtered out Android session");
                return Ok(Vec::new());
            }
        }
        Ok(vec![candidate])
    }
}

/// Whether a WayDroid session is up (`waydroid status` reports RUNNING).
pub fn waydroid_running() -> bool {
    output_with_timeout(Command::new("waydroid").arg("status"), COMMAND_TIMEOUT)
        .map(|out| String::from_utf8_lossy(&out.stdout).contains("RUNNING"))
        .unwrap_or(false)
}

fn detect_su() -> Vec<String> {
    const CANDIDATES: &[&[&str]] = &[&["su", "-c"], &["su", "0"], &["/system/bin/su", "-c"]];

    for candidate in CANDIDATES {
        let mut probe = Command::new(candidate[0]);
        probe.args(&candidate[1..]).arg("echo test");
        let works = output_with_timeout(&mut probe, COMMAND_TIMEOUT)
            .is_ok_and(|out| out.status.success());
        if works {
            debug!(su = ?candidate, "Found working su");
            return candidate.iter().map(|s| s.to_string()).collect();
        }
    }
    vec!["su".into(), "-c".into()]
}

/// `Command::output` with a deadline. The child is killed once `timeout`
/// passes and the call fails with `TimedOut`.
fn output_with_timeout(command: &mut Command, timeout: Duration) -> io::Result<Output> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // Drain both pipes while waiting so a large dump cannot fill them.
    let stdout = child.stdout.take().map(drain_pipe);
    let stderr = child.stderr.take().map(drain_pipe);

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("timed out after {}s", timeout.as_secs_f32()),
            ));
        }
        thread::sleep(WAIT_STEP);
    };

    let collect = |reader: Option<thread::JoinHandle<Vec<u8>>>| {
        reader.and_then(|r| r.join().ok()).unwrap_or_default()
    };
    Ok(Output {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn drain_pipe(mut pipe: impl Read + Send + 'static) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPOTIFY_DUMP: &str = "\
MEDIA SESSION SERVICE (dumpsys media_session)

Sessions Stack - have 1 sessions:
  Media session com.spotify.music/spotify-media-session (userId=0)
    ownerPid=4242, ownerUid=10123, userId=0
    package=com.spotify.music
    active=true
    state=PlaybackState {state=3, position=61234, buffered position=0, speed=1.0, updated=123456, actions=3669967, custom actions=[], active item id=-1, error=null}
    metadata: size=7, description=Bohemian Rhapsody, Queen, A Night at the Opera
    android.media.metadata.TITLE: Bohemian Rhapsody
    android.media.metadata.ARTIST: Queen
    android.media.metadata.ALBUM: A Night at the Opera
    android.media.metadata.DURATION: 354000
Media button session is com.spotify.music/spotify-media-session (userId=0)
";

    const DESCRIPTION_ONLY_DUMP: &str = "\
Sessions Stack - have 1 sessions:
  Media session com.amazon.mp3/MediaSessionController (userId=0)
    package=com.amazon.mp3
    state=PlaybackState {state=2, position=1000, buffered position=0, speed=0.0}
    metadata: size=4, description=Levitating, Dua Lipa, Future Nostalgia
Media button session is com.amazon.mp3/MediaSessionController (userId=0)
";

    fn db() -> SourceDatabase {
        SourceDatabase::embedded()
    }

    #[test]
    fn test_parse_full_metadata() {
        let c = parse_media_session(SPOTIFY_DUMP, &db(), DumpsysFlavor::Android).unwrap();
        assert_eq!(c.source, "Spotify");
        assert_eq!(c.title, "Bohemian Rhapsody");
        assert_eq!(c.artist, "Queen");
        assert_eq!(c.album, "A Night at the Opera");
        assert_eq!(c.duration_ms, Some(354_000));
        assert_eq!(c.position_ms, Some(61_234));
        assert_eq!(c.status, Some(PlaybackStatus::Playing));
    }

    #[test]
    fn test_parse_description_fallback() {
        let c = parse_media_session(DESCRIPTION_ONLY_DUMP, &db(), DumpsysFlavor::Waydroid).unwrap();
        assert_eq!(c.source, "Amazon Music (WayDroid)");
        assert_eq!(c.title, "Levitating");
        assert_eq!(c.artist, "Dua Lipa");
        assert_eq!(c.album, "Future Nostalgia");
        assert_eq!(c.status, Some(PlaybackStatus::Paused));
    }

    #[test]
    fn test_parse_description_title_dash_artist() {
        let dump = "\
  Media session org.example.radio/session (userId=0)
    state=PlaybackState {state=1, position=0}
    metadata: size=1, description=Song Name - Some Band
global priority session is org.example.radio/session (userId=0)
";
        let c = parse_media_session(dump, &db(), DumpsysFlavor::Android).unwrap();
        assert_eq!(c.title, "Song Name");
        assert_eq!(c.artist, "Some Band");
        assert_eq!(c.source, "Radio");
        assert_eq!(c.status, Some(PlaybackStatus::Stopped));
    }

    #[test]
    fn test_button_session_wins_over_first_listed() {
        let dump = format!(
            "  Media session com.android.bluetooth/BluetoothMediaBrowserService (userId=0)\n    active=false\n{SPOTIFY_DUMP}"
        );
        assert_eq!(active_package(&dump), Some("com.spotify.music"));
    }

    #[test]
    fn test_no_session_is_none() {
        assert!(parse_media_session("", &db(), DumpsysFlavor::Android).is_none());
        assert!(parse_media_session(
            "Sessions Stack - have 0 sessions:\n",
            &db(),
            DumpsysFlavor::Android
        )
        .is_none());
    }

    #[test]
    fn test_session_without_title_or_artist_is_none() {
        let dump = "\
  Media session com.example.app/session (userId=0)
    state=PlaybackState {state=3, position=0}
    metadata: size=0, description=null, null, null
";
        assert!(parse_media_session(dump, &db(), DumpsysFlavor::Android).is_none());
    }

    #[test]
    fn test_unknown_state_code() {
        let dump = "\
  Media session com.example.app/session (userId=0)
    state=PlaybackState {state=6, position=0}
    android.media.metadata.TITLE: Buffering Song
";
        let c = parse_media_session(dump, &db(), DumpsysFlavor::Android).unwrap();
        assert_eq!(c.status, Some(PlaybackStatus::Unknown));
    }

    #[test]
    fn test_package_display_name() {
        assert_eq!(package_display_name("com.example.my_player"), "My Player");
        assert_eq!(package_display_name("player"), "Player");
        assert_eq!(package_display_name("org.example.RADIO"), "Radio");
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_command_is_killed() {
        let started = Instant::now();
        let err = output_with_timeout(
            Command::new("sleep").arg("10"),
            Duration::from_millis(200),
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_output_is_collected() {
        let output = output_with_timeout(
            Command::new("sh").args(["-c", "echo media; echo oops >&2"]),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "media");
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "oops");
    }

    #[test]
    fn test_section_window_respects_char_boundaries() {
        let mut dump = String::from("  Media session com.example.app/s (userId=0)\n");
        dump.push_str(&"é".repeat(SESSION_WINDOW));
        // Must not panic on a multi-byte boundary.
        let _ = parse_media_session(&dump, &db(), DumpsysFlavor::Android);
    }
}
