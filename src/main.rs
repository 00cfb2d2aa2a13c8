use crossbeam_channel::{Receiver, RecvTimeoutError};
use playseq::audio::{NullQueueBackend, QueueBackend, RodioQueueBackend};
use playseq::config;
use playseq::model::{PersistedState, PlayMode, Track, TrackId};
use playseq::player::{PlayerEvent, PlayerManager};
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
struct CliArgs {
    mode: Option<PlayMode>,
    volume: Option<f32>,
    files: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args(std::env::args().skip(1).collect())?;
    let saved = config::load_state().unwrap_or_else(|err| {
        log::warn!("could not load saved state: {err:#}");
        PersistedState::default()
    });

    let tracks: Vec<Track> = args
        .files
        .iter()
        .enumerate()
        .map(|(n, path)| Track::from_path(TrackId(n as u64), path))
        .collect();

    match RodioQueueBackend::new() {
        Ok(backend) => {
            log::info!("audio output ready ({} channels)", backend.output_channels());
            run(PlayerManager::new(backend), &args, &saved, tracks)
        }
        Err(err) => {
            log::warn!("no audio output, continuing silently: {err:#}");
            run(PlayerManager::new(NullQueueBackend::new()), &args, &saved, tracks)
        }
    }
}

fn run<B: QueueBackend>(
    mut player: PlayerManager<B>,
    args: &CliArgs,
    saved: &PersistedState,
    tracks: Vec<Track>,
) -> anyhow::Result<()> {
    let events = player.subscribe();
    player.set_play_mode(args.mode.unwrap_or(saved.play_mode));
    player.set_volume(args.volume.unwrap_or(saved.volume));
    player.load_library(tracks);
    player.play();

    let commands = spawn_stdin_reader();
    loop {
        match commands.recv_timeout(TICK) {
            Ok(line) => {
                if !run_command(&mut player, &line) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        player.tick();
        for event in events.try_iter() {
            report(&event);
        }
    }

    let state = PersistedState {
        play_mode: player.play_mode(),
        volume: player.volume(),
    };
    player.clear_queue();
    config::save_state(&state)
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Returns `false` when the driver should exit.
fn run_command<B: QueueBackend>(player: &mut PlayerManager<B>, raw: &str) -> bool {
    let input = raw.trim();
    let mut split = input.splitn(2, char::is_whitespace);
    let command = split.next().unwrap_or_default();
    let rest = split.next().unwrap_or("").trim();

    match command {
        "" => {}
        "play" => player.play(),
        "pause" => player.pause(),
        "toggle" => player.toggle_playback(),
        "stop" => player.stop(),
        "next" | "n" => player.play_next(),
        "prev" | "p" => player.play_previous(),
        "clear" => player.clear_queue(),
        "goto" => match rest.parse::<usize>() {
            Ok(number) if number > 0 => player.play_track(number - 1),
            _ => println!("Usage: goto <track number>"),
        },
        "mode" => {
            if rest.is_empty() {
                player.cycle_mode();
            } else if let Some(mode) = PlayMode::parse(rest) {
                player.set_play_mode(mode);
            } else {
                println!("Usage: mode <sequential|single|random>");
            }
        }
        "vol" => match rest.parse::<f32>() {
            Ok(volume) => player.set_volume(volume),
            Err(_) => println!("Usage: vol <0.0-2.5>"),
        },
        "status" => print_status(player),
        "quit" | "q" => return false,
        "help" => print_help(),
        other => println!("Unknown command {other}. Use help"),
    }
    true
}

fn report(event: &PlayerEvent) {
    match event {
        PlayerEvent::TrackChanged(Some(track)) => {
            println!("Now playing: {} - {}", track.title(), track.artist());
        }
        PlayerEvent::TrackChanged(None) => println!("Nothing selected"),
        PlayerEvent::PlaybackStateChanged(playing) => {
            println!("{}", if *playing { "Playing" } else { "Paused" });
        }
        PlayerEvent::ModeChanged(mode) => println!("Play mode: {mode:?}"),
    }
}

fn print_status<B: QueueBackend>(player: &PlayerManager<B>) {
    let Some(now) = player.now_playing() else {
        println!("Idle ({} tracks loaded)", player.playlist().count());
        return;
    };
    let elapsed = now.elapsed.map(format_time).unwrap_or_else(|| "--:--".into());
    let total = now.duration.map(format_time).unwrap_or_else(|| "--:--".into());
    println!(
        "{} - {} [{elapsed}/{total}] {:?} track {}/{} vol {:.2}",
        now.title,
        now.artist,
        player.play_mode(),
        player.playlist().current_index() + 1,
        player.playlist().count(),
        player.volume()
    );
}

fn format_time(duration: Duration) -> String {
    let seconds = duration.as_secs();
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn parse_args(args: Vec<String>) -> anyhow::Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--mode" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--mode requires sequential, single or random");
                };
                let Some(mode) = PlayMode::parse(value) else {
                    anyhow::bail!("unknown play mode {value}");
                };
                out.mode = Some(mode);
            }
            "--volume" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--volume requires a value");
                };
                out.volume = Some(
                    value
                        .parse()
                        .map_err(|_| anyhow::anyhow!("invalid volume {value}"))?,
                );
            }
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            flag if flag.starts_with("--") => anyhow::bail!("unknown argument {flag}"),
            file => out.files.push(PathBuf::from(file)),
        }
        index += 1;
    }
    Ok(out)
}

fn print_usage() {
    println!("playseq [--mode sequential|single|random] [--volume v] <file>...");
    print_help();
}

fn print_help() {
    println!("Commands: play | pause | toggle | stop | next | prev | goto <n> | mode [m] | vol <v> | clear | status | quit");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn parses_mode_volume_and_files() {
        let parsed = parse_args(args(&["--mode", "random", "a.mp3", "--volume", "0.5", "b.flac"]))
            .expect("valid args");
        assert_eq!(parsed.mode, Some(PlayMode::Random));
        assert_eq!(parsed.volume, Some(0.5));
        assert_eq!(
            parsed.files,
            vec![PathBuf::from("a.mp3"), PathBuf::from("b.flac")]
        );
    }

    #[test]
    fn rejects_unknown_flags_and_bad_values() {
        assert!(parse_args(args(&["--loud"])).is_err());
        assert!(parse_args(args(&["--mode", "sideways"])).is_err());
        assert!(parse_args(args(&["--volume"])).is_err());
    }

    #[test]
    fn commands_drive_the_player() {
        let mut player = PlayerManager::new(NullQueueBackend::new());
        player.load_library(
            ["a", "b", "c"]
                .iter()
                .enumerate()
                .map(|(n, name)| Track::new(TrackId(n as u64), *name, "x", *name))
                .collect(),
        );

        assert!(run_command(&mut player, "goto 3"));
        assert_eq!(player.playlist().current_index(), 2);
        assert!(run_command(&mut player, "mode single"));
        assert_eq!(player.play_mode(), PlayMode::SingleLoop);
        assert!(run_command(&mut player, "goto 9"));
        assert_eq!(player.playlist().current_index(), 2);
        assert!(!run_command(&mut player, "quit"));
    }
}
