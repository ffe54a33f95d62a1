/// Game process assembly and output plumbing.
use super::types::ProcessDescription;
use super::watcher::{LogLine, StreamKind, WatcherSet};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;

/// Build the full game command: runtime, JVM arguments, main class, game
/// arguments; piped stdio and detached from the launcher process.
pub fn build_command(desc: &ProcessDescription) -> Command {
    let mut cmd = Command::new(&desc.runtime);

    for arg in jvm_arguments(desc) {
        cmd.arg(arg);
    }
    cmd.arg(&desc.loader.main_class);
    for arg in game_arguments(desc) {
        cmd.arg(arg);
    }

    cmd.current_dir(&desc.game_dir);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    detach(&mut cmd);
    cmd
}

/// Spawn the game process. The raw io::Error is surfaced so the caller can
/// classify it as a spawn failure.
pub fn spawn(desc: &ProcessDescription) -> std::io::Result<Child> {
    log::info!(
        "Spawning game process for {} with runtime {:?}",
        desc.server_id,
        desc.runtime
    );
    build_command(desc).spawn()
}

/// Detach the child so it survives launcher shutdown while keeping stdio
/// piped for supervision.
fn detach(cmd: &mut Command) {
    #[cfg(windows)]
    {
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }
    #[cfg(unix)]
    {
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
    }
}

/// Take the child's stdio pipes and forward every line, in arrival order, to
/// the watcher set. The reader tasks end when the pipes close.
pub fn attach_stream_readers(child: &mut Child, watchers: Arc<WatcherSet>) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(read_lines(stdout, StreamKind::Stdout, watchers.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(read_lines(stderr, StreamKind::Stderr, watchers));
    }
}

async fn read_lines<R>(reader: R, stream: StreamKind, watchers: Arc<WatcherSet>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(text)) = lines.next_line().await {
        watchers.dispatch(&LogLine { stream, text });
    }
}

fn jvm_arguments(desc: &ProcessDescription) -> Vec<String> {
    substitute_all(&desc.loader.jvm_args, &variables(desc))
}

fn game_arguments(desc: &ProcessDescription) -> Vec<String> {
    substitute_all(&desc.version.game_args, &variables(desc))
}

fn variables(desc: &ProcessDescription) -> HashMap<&'static str, String> {
    let mut vars = HashMap::new();
    vars.insert(
        "${game_directory}",
        desc.game_dir.to_string_lossy().to_string(),
    );
    vars.insert(
        "${common_directory}",
        desc.common_dir.to_string_lossy().to_string(),
    );
    vars.insert("${server_address}", desc.server_address.clone());
    vars.insert("${version_name}", desc.version.id.clone());
    vars.insert("${client_version}", desc.client_version.clone());

    if let Some(user) = &desc.user {
        vars.insert("${auth_player_name}", user.display_name.clone());
        vars.insert("${auth_uuid}", user.uuid.clone());
        vars.insert("${auth_access_token}", user.access_token.clone());
        vars.insert("${user_type}", user.user_type.clone());
    }

    vars
}

/// Substitute known placeholders. Arguments with placeholders we cannot
/// resolve are dropped, together with a dangling option switch in front of
/// them, so the runtime never sees a malformed pair.
fn substitute_all(templates: &[String], vars: &HashMap<&'static str, String>) -> Vec<String> {
    let mut args: Vec<String> = Vec::with_capacity(templates.len());

    for template in templates {
        let mut resolved = template.clone();
        for (key, value) in vars {
            resolved = resolved.replace(*key, value.as_str());
        }

        if resolved.contains("${") {
            log::debug!("Dropping argument with unresolved placeholder: {}", template);
            drop_dangling_option(&mut args);
            continue;
        }
        if resolved.trim().is_empty() {
            continue;
        }
        args.push(resolved);
    }

    args
}

fn drop_dangling_option(args: &mut Vec<String>) {
    if args.last().is_some_and(|last| last.starts_with('-')) {
        let _ = args.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthUser;
    use crate::distribution::{LoaderMetadata, VersionMetadata};
    use std::path::PathBuf;

    fn description(user: Option<AuthUser>) -> ProcessDescription {
        ProcessDescription {
            server_id: "ember-main".to_string(),
            server_address: "play.ember.example:25565".to_string(),
            runtime: PathBuf::from("/opt/java/bin/java"),
            loader: LoaderMetadata {
                id: "ember-loader-0.4.2".to_string(),
                main_class: "org.ember.loader.Launch".to_string(),
                jvm_args: vec![
                    "-Xmx4G".to_string(),
                    "-Dember.common=${common_directory}".to_string(),
                ],
            },
            version: VersionMetadata {
                id: "1.20.1".to_string(),
                game_args: vec![
                    "--username".to_string(),
                    "${auth_player_name}".to_string(),
                    "--uuid".to_string(),
                    "${auth_uuid}".to_string(),
                    "--server".to_string(),
                    "${server_address}".to_string(),
                    "--version".to_string(),
                    "${version_name}".to_string(),
                ],
            },
            user,
            client_version: "0.1.0".to_string(),
            game_dir: PathBuf::from("/data/instances/ember-main"),
            common_dir: PathBuf::from("/data/common"),
        }
    }

    fn offline_user() -> AuthUser {
        AuthUser {
            display_name: "Alex".to_string(),
            uuid: "0000-1111".to_string(),
            access_token: "token".to_string(),
            user_type: "legacy".to_string(),
        }
    }

    #[test]
    fn substitutes_known_placeholders() {
        let desc = description(Some(offline_user()));
        let jvm = jvm_arguments(&desc);
        assert_eq!(
            jvm,
            vec!["-Xmx4G", "-Dember.common=/data/common"]
        );

        let game = game_arguments(&desc);
        assert_eq!(
            game,
            vec![
                "--username",
                "Alex",
                "--uuid",
                "0000-1111",
                "--server",
                "play.ember.example:25565",
                "--version",
                "1.20.1",
            ]
        );
    }

    #[test]
    fn drops_auth_pairs_when_no_user() {
        let desc = description(None);
        let game = game_arguments(&desc);
        // Auth placeholders are unresolved without a user; the dangling
        // switches in front of them must go too.
        assert_eq!(
            game,
            vec![
                "--server",
                "play.ember.example:25565",
                "--version",
                "1.20.1",
            ]
        );
    }

    #[test]
    fn unresolved_value_without_switch_is_just_dropped() {
        let vars = HashMap::new();
        let args = substitute_all(
            &["plain".to_string(), "${mystery}".to_string()],
            &vars,
        );
        assert_eq!(args, vec!["plain"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawned_process_lines_reach_watchers() {
        use crate::launch::watcher::{LogWatcher, StreamKind};
        use regex::Regex;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let tmp = tempfile::tempdir().unwrap();
        let desc = ProcessDescription {
            server_id: "test".to_string(),
            server_address: "localhost:0".to_string(),
            runtime: PathBuf::from("/bin/sh"),
            loader: LoaderMetadata {
                id: "sh".to_string(),
                main_class: "-c".to_string(),
                jvm_args: Vec::new(),
            },
            version: VersionMetadata {
                id: "test".to_string(),
                game_args: vec!["echo out-line; echo err-line 1>&2".to_string()],
            },
            user: None,
            client_version: "0.0.0".to_string(),
            game_dir: tmp.path().to_path_buf(),
            common_dir: tmp.path().to_path_buf(),
        };

        let watchers = Arc::new(WatcherSet::new());
        let stdout_hits = Arc::new(AtomicUsize::new(0));
        let stderr_hits = Arc::new(AtomicUsize::new(0));
        let out_cb = stdout_hits.clone();
        let err_cb = stderr_hits.clone();
        watchers.attach(LogWatcher::new(
            StreamKind::Stdout,
            Regex::new("out-line").unwrap(),
            Arc::new(move |_| {
                out_cb.fetch_add(1, Ordering::SeqCst);
            }),
        ));
        watchers.attach(LogWatcher::new(
            StreamKind::Stderr,
            Regex::new("err-line").unwrap(),
            Arc::new(move |_| {
                err_cb.fetch_add(1, Ordering::SeqCst);
            }),
        ));

        let mut child = spawn(&desc).unwrap();
        attach_stream_readers(&mut child, watchers);
        let status = child.wait().await.unwrap();
        assert!(status.success());

        // Readers drain asynchronously after exit.
        for _ in 0..50 {
            if stdout_hits.load(Ordering::SeqCst) == 1 && stderr_hits.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(stdout_hits.load(Ordering::SeqCst), 1);
        assert_eq!(stderr_hits.load(Ordering::SeqCst), 1);
    }
}
