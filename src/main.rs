//! QCHECKIN operator daemon entrypoint

#[cfg(not(feature = "camera"))]
compile_error!("qcheckind requires the `camera` feature");

use clap::Parser;
use qcheckin::{
    CameraDeviceManager, DraftUpdate, Error, Facing, FrameLoopFactory, HttpCheckinService,
    QcheckinConfig, QrEncoder, Result, ScanSession, SessionState, SessionStatus,
    SharedSecretGate, V4lBackend, camera, logging,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing::info;

type Input = Lines<BufReader<Stdin>>;

#[derive(Parser, Debug)]
#[command(
    name = "qcheckind",
    version,
    about = "Camera-driven ticket check-in for event staff"
)]
struct Cli {
    /// Optional configuration file (toml/yaml). Defaults to qcheckin.{toml,yaml} in cwd/XDG config.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Camera facing for the first scan (`environment` or `user`)
    #[arg(long, value_name = "FACING")]
    facing: Option<Facing>,

    /// Override the check-in service base URL
    #[arg(long, value_name = "URL")]
    service_url: Option<String>,

    /// List detected cameras and exit
    #[arg(long)]
    list_cameras: bool,

    /// Render a ticket identifier as a QR code PNG and exit
    #[arg(long, value_name = "ID")]
    render_ticket: Option<String>,

    /// Output path for --render-ticket
    #[arg(long, value_name = "PATH", default_value = "ticket.png", requires = "render_ticket")]
    out: PathBuf,

    /// Print session status changes as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_cameras {
        list_cameras();
        return Ok(());
    }

    if let Some(ref ticket) = cli.render_ticket {
        QrEncoder::new().write_png(ticket, &cli.out)?;
        println!("Wrote ticket {ticket} to {}", cli.out.display());
        return Ok(());
    }

    let mut config = QcheckinConfig::load(cli.config.as_deref())?;

    if let Some(facing) = cli.facing {
        config.camera.facing = facing;
    }

    if let Some(ref url) = cli.service_url {
        config.service.base_url = url.clone();
    }

    logging::init(&config.logging)?;

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let gate = Arc::new(SharedSecretGate::new(config.auth.operator_secret.clone()));
    sign_in(&gate, &mut input).await?;

    let camera_config = config.camera_config()?;
    info!(?camera_config, "Starting QCHECKIN scanner");

    let backend = Arc::new(V4lBackend::new(camera_config));
    let devices = CameraDeviceManager::discover(backend.as_ref()).await;
    for device in devices.list_cameras() {
        info!(device = %device.id, facing = %device.facing, label = ?device.label, "Camera available");
    }

    let engines = Arc::new(FrameLoopFactory::new(config.scanner.frame_interval()));
    let service = HttpCheckinService::new(&config.service)?;

    let mut session =
        ScanSession::new(backend, engines, gate, devices).with_facing(config.camera.facing);
    let mut status = session.subscribe();

    print_help();
    print_status(&session.status(), cli.json);

    loop {
        tokio::select! {
            changed = session.pump() => {
                if changed && matches!(session.state(), SessionState::Captured(_)) {
                    let current = status.borrow_and_update().clone();
                    print_status(&current, cli.json);
                    review(&mut session, &service, &mut input).await?;
                }
            }
            Ok(()) = status.changed() => {
                let current = status.borrow_and_update().clone();
                print_status(&current, cli.json);
            }
            line = input.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if !handle_command(&mut session, line.trim()) {
                    break;
                }
            }
        }
    }

    session.close();
    info!("Scanner shut down");
    Ok(())
}

fn list_cameras() {
    let devices = camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 cameras detected");
    } else {
        println!("Discovered cameras:");
        for dev in devices {
            println!("  [{}] {} ({}, {})", dev.index, dev.name, dev.path, dev.driver);
        }
    }
}

fn print_help() {
    println!("Commands: start | stop | flip | retry | status | quit");
}

fn print_status(status: &SessionStatus, json: bool) {
    if json {
        match serde_json::to_string(status) {
            Ok(line) => println!("{line}"),
            Err(err) => tracing::warn!("Failed to serialise status: {err}"),
        }
    } else {
        println!(
            "[{} #{} {}] {}",
            status.state.name(),
            status.generation,
            status.facing,
            status.message
        );
    }
}

/// Returns false when the operator asked to quit
fn handle_command(session: &mut ScanSession, command: &str) -> bool {
    let result = match command {
        "" => Ok(()),
        "start" => session.start(),
        "retry" => session.retry(),
        "stop" => {
            session.stop();
            Ok(())
        }
        "flip" => {
            if !session.flip_camera() {
                println!("Only one camera available");
            }
            Ok(())
        }
        "status" => {
            print_status(&session.status(), false);
            Ok(())
        }
        "help" => {
            print_help();
            Ok(())
        }
        "quit" | "exit" => return false,
        other => {
            println!("Unknown command '{other}'");
            print_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        println!("{err}");
    }
    true
}

async fn prompt(input: &mut Input, label: &str) -> Result<Option<String>> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;
    Ok(input.next_line().await?.map(|line| line.trim().to_string()))
}

async fn sign_in(gate: &SharedSecretGate, input: &mut Input) -> Result<()> {
    println!("Operator sign-in");
    loop {
        let Some(username) = prompt(input, "Username: ").await? else {
            return Err(Error::Unauthorized("Sign-in aborted".to_string()));
        };
        let Some(email) = prompt(input, "Email: ").await? else {
            return Err(Error::Unauthorized("Sign-in aborted".to_string()));
        };
        let Some(password) = prompt(input, "Password: ").await? else {
            return Err(Error::Unauthorized("Sign-in aborted".to_string()));
        };

        match gate.sign_in(&username, &email, &password) {
            Ok(()) => return Ok(()),
            Err(Error::Unauthorized(message)) => println!("{message}"),
            Err(err) => return Err(err),
        }
    }
}

/// Walk the operator through reviewing the captured ticket until it is
/// submitted or cancelled. The session is back at `Idle` on return unless
/// stdin closed mid-review.
async fn review(
    session: &mut ScanSession,
    service: &HttpCheckinService,
    input: &mut Input,
) -> Result<()> {
    loop {
        let Some(mut form) = session.review() else {
            return Ok(());
        };
        if let Some(payload) = form.payload() {
            println!(
                "Ticket {} scanned at {}",
                payload.ticket_id(),
                payload.captured_at().to_rfc3339()
            );
        }

        let Some(present) = prompt(input, "Participant present? [y/N/cancel]: ").await? else {
            return Ok(());
        };
        if present.eq_ignore_ascii_case("cancel") {
            form.cancel();
            println!("Review cancelled. Type 'start' to scan again.");
            return Ok(());
        }

        let mut update =
            DraftUpdate::default().presence_confirmed(present.eq_ignore_ascii_case("y"));

        let draft = form.draft().cloned().unwrap_or_default();
        let Some(name) = prompt(input, &field_label("Reviewer name", &draft.reviewer_name)).await?
        else {
            return Ok(());
        };
        if !name.is_empty() {
            update = update.reviewer_name(name);
        }
        let Some(email) =
            prompt(input, &field_label("Reviewer email", &draft.reviewer_email)).await?
        else {
            return Ok(());
        };
        if !email.is_empty() {
            update = update.reviewer_email(email);
        }

        form.update_draft(update);
        match form.submit(service).await {
            Ok(ack) => {
                println!("Check-in recorded (HTTP {}). Type 'start' to scan again.", ack.status);
                return Ok(());
            }
            Err(err @ (Error::Validation(_) | Error::Submission { .. })) => {
                println!("{err}");
            }
            Err(err) => return Err(err),
        }
    }
}

fn field_label(name: &str, current: &str) -> String {
    if current.is_empty() {
        format!("{name}: ")
    } else {
        format!("{name} [{current}]: ")
    }
}
