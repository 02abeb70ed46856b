mod config;
mod render;
mod simulated;
mod terminal;

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use bridge::{params_from, Backend, EventChannel, InvokeParams, LocalEventBus};
use clap::{Args, Parser, Subcommand};
use client_core::{
    catalog::{self, InstallParams, SideloadParams},
    BackendClient, ClientContext, OperationBoard, OperationDispatcher, TwoFactorPrompt,
};
use shared::domain::Operation;
use tokio_stream::{wrappers::WatchStream, StreamExt};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::{config::Settings, render::BoardRenderer};

#[derive(Parser, Debug)]
#[command(about = "Install SideStore and sideload apps onto a connected device")]
struct Cli {
    #[command(flatten)]
    account: AccountArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct AccountArgs {
    #[arg(long, global = true)]
    email: Option<String>,
    #[arg(long, global = true)]
    password: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List connected devices.
    Devices,
    /// Sign in with an Apple ID.
    Login,
    /// Install SideStore on the first connected device.
    Install {
        #[arg(long)]
        nightly: bool,
        #[arg(long)]
        live_container: bool,
    },
    /// Sign and install an .ipa file.
    Sideload { app_path: PathBuf },
}

struct App {
    settings: Settings,
    events: Arc<dyn EventChannel>,
    backend: Arc<dyn Backend>,
    client: BackendClient,
    context: ClientContext,
}

impl App {
    async fn log_in(&mut self, account: &AccountArgs) -> Result<()> {
        let (Some(email), Some(password)) = (&account.email, &account.password) else {
            return Ok(());
        };
        let apple_id = self
            .client
            .login_email_pass(email, password, &self.settings.anisette_server)
            .await
            .context("login failed")?;
        info!(%apple_id, "logged in");
        self.context.logged_in_as = Some(apple_id);
        Ok(())
    }

    async fn select_device(&mut self) -> Result<()> {
        let devices = self.client.list_devices().await?;
        let selected = self.context.select_first(&devices).cloned();
        self.client.set_selected_device(selected.as_ref()).await?;
        Ok(())
    }

    async fn run_operation(&self, operation: Operation, params: InvokeParams) -> Result<()> {
        let board = Arc::new(OperationBoard::new());
        let dispatcher = OperationDispatcher::new(
            Arc::clone(&self.events),
            Arc::clone(&self.backend),
            Arc::clone(&board),
        );
        let mut changes = WatchStream::new(board.watch());
        let mut renderer = BoardRenderer::default();

        let dispatch = dispatcher.dispatch(operation.clone(), params);
        tokio::pin!(dispatch);
        let result = loop {
            tokio::select! {
                result = &mut dispatch => break result,
                Some(session) = changes.next() => print_lines(renderer.render(session.as_ref())),
            }
        };
        print_lines(renderer.render(board.current().as_ref()));

        match result {
            Ok(_) => {
                match (&operation.success_title, &operation.success_message) {
                    (Some(title), Some(message)) => println!("{title}\n{message}"),
                    (Some(title), None) => println!("{title}"),
                    _ => println!("{} finished", operation.title),
                }
                Ok(())
            }
            Err(err) => {
                error!(operation = %operation.id, error = %err, "operation failed");
                Err(err).with_context(|| format!("{} failed", operation.title))
            }
        }
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = config::load_settings();
    let filter = EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    let events: Arc<dyn EventChannel> = Arc::new(LocalEventBus::new());
    let backend: Arc<dyn Backend> = Arc::new(simulated::simulated_backend(
        Arc::clone(&events),
        &settings,
    ));

    let _output = terminal::spawn_build_output(Arc::clone(&events)).await?;
    let prompt = Arc::new(TwoFactorPrompt::attach(Arc::clone(&events)).await?);
    let _codes = terminal::spawn_code_reader(prompt);

    let mut app = App {
        client: BackendClient::new(Arc::clone(&backend)),
        settings,
        events,
        backend,
        context: ClientContext::default(),
    };

    match cli.command {
        Command::Devices => {
            for device in app.client.list_devices().await? {
                println!(
                    "{}\t{}\t{:?}\t{}",
                    device.id, device.name, device.connection_type, device.uuid
                );
            }
        }
        Command::Login => {
            if cli.account.email.is_none() || cli.account.password.is_none() {
                bail!("--email and --password are required to log in");
            }
            app.log_in(&cli.account).await?;
            let who = app.client.logged_in_as().await?;
            println!("Logged in as {}", who.unwrap_or_default());
        }
        Command::Install {
            nightly,
            live_container,
        } => {
            app.log_in(&cli.account).await?;
            app.select_device().await?;
            app.context.require_install_ready()?;
            let install = InstallParams {
                nightly,
                live_container,
            };
            app.run_operation(install.operation(), params_from(&install)?)
                .await?;
        }
        Command::Sideload { app_path } => {
            app.log_in(&cli.account).await?;
            app.select_device().await?;
            app.context.require_install_ready()?;
            let sideload = SideloadParams { app_path };
            app.run_operation(catalog::sideload(), params_from(&sideload)?)
                .await?;
        }
    }

    Ok(())
}
