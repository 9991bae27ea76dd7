//! interactive bulletin board client
//!
//! deploys or joins a board contract, waits for the wallet to sync and
//! fund, then drives the board from a numbered menu while a background
//! pipeline keeps the derived view current.

use anyhow::Context;
use bboard_client::{
    await_funds, emulated_providers, BoardCommand, CallReceipt, ClientConfig, ContractAddress,
    DeployArgs, FilePrivateStateStore, Providers, Session,
};
use clap::Parser;
use rand::RngCore;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

type StdinLines = Lines<BufReader<Stdin>>;

#[derive(Parser)]
#[command(name = "bboard")]
#[command(about = "Interactive client for the bulletin board contract")]
struct Cli {
    /// directory for persisted private session state
    #[arg(long, default_value = ".bboard")]
    state_dir: PathBuf,

    /// join an existing board at this address, skipping the deploy/join menu
    #[arg(long)]
    join: Option<ContractAddress>,

    /// session key in the private state store
    #[arg(long, default_value = "operator")]
    session: String,

    /// funding gate poll interval in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,
}

/// the closed set of menu options; anything else re-prompts
enum MenuChoice {
    Post,
    TakeDown,
    ShowLedger,
    ShowPrivate,
    ShowDerived,
    Exit,
}

impl MenuChoice {
    fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(Self::Post),
            "2" => Some(Self::TakeDown),
            "3" => Some(Self::ShowLedger),
            "4" => Some(Self::ShowPrivate),
            "5" => Some(Self::ShowDerived),
            "6" | "q" | "exit" => Some(Self::Exit),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bboard=info,bboard_client=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::with_state_dir(&cli.state_dir);
    if let Some(ms) = cli.poll_interval_ms {
        config.funding_poll_interval_ms = ms;
    }

    let store = Arc::new(FilePrivateStateStore::new(&config.state_dir)?);
    let (providers, _chain, wallet) = emulated_providers(store, &config);
    wallet.start_scripted_sync(config.faucet_amount);

    println!("waiting for wallet sync and funds...");
    let balance = await_funds(&*providers.wallet, &config).await?;
    println!("wallet ready: {}", config.format_balance(balance));

    let mut rng = rand::rngs::OsRng;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut session = match cli.join {
        Some(address) => {
            let session = Session::join(providers, &cli.session, address, &mut rng).await?;
            println!("joined board at {}", session.address());
            session
        }
        None => {
            match establish_interactive(&providers, &cli.session, &mut rng, &mut lines).await? {
                Some(session) => session,
                None => return Ok(()), // operator chose to exit
            }
        }
    };

    let mut feed = session.subscribe().context("derived state feed already taken")?;
    // announce every pipeline emission; the menu reads the current view
    // from the pipeline's state cell
    let announcer = tokio::spawn(async move {
        while let Some(derived) = feed.recv().await {
            let ownership = if derived.is_owner { " (yours)" } else { "" };
            match &derived.message {
                Some(message) => println!(
                    "\n[board] instance {} | {} post(s) | \"{message}\"{ownership}",
                    derived.instance, derived.posts,
                ),
                None => println!(
                    "\n[board] instance {} | {} post(s) | vacant",
                    derived.instance, derived.posts,
                ),
            }
        }
    });

    let result = run_menu(&session, &mut lines).await;
    if let Err(e) = &result {
        tracing::error!("interactive loop failed: {e}");
    }

    // ordered best-effort teardown: stop announcing, then close the session
    announcer.abort();
    session.close().await;
    println!("goodbye");
    result
}

/// deploy/join menu; establishment failures are reported and re-prompted,
/// never fatal to the process
async fn establish_interactive(
    providers: &Providers,
    session_key: &str,
    rng: &mut dyn RngCore,
    lines: &mut StdinLines,
) -> anyhow::Result<Option<Session>> {
    loop {
        println!("\n  1) deploy a new board");
        println!("  2) join an existing board");
        println!("  3) exit");
        prompt("> ");

        let Some(line) = lines.next_line().await? else {
            return Ok(None); // stdin closed
        };
        match line.trim() {
            "1" => {
                match Session::deploy(providers.clone(), session_key, DeployArgs::default(), rng)
                    .await
                {
                    Ok(session) => {
                        println!("deployed new board at {}", session.address());
                        return Ok(Some(session));
                    }
                    Err(e) => println!("deploy failed: {e}"),
                }
            }
            "2" => {
                prompt("address> ");
                let Some(addr_line) = lines.next_line().await? else {
                    return Ok(None);
                };
                let address = match addr_line.trim().parse::<ContractAddress>() {
                    Ok(address) => address,
                    Err(e) => {
                        println!("{e}");
                        continue;
                    }
                };
                match Session::join(providers.clone(), session_key, address, rng).await {
                    Ok(session) => {
                        println!("joined board at {}", session.address());
                        return Ok(Some(session));
                    }
                    Err(e) => println!("join failed: {e}"),
                }
            }
            "3" | "q" | "exit" => return Ok(None),
            other => println!("unrecognized option '{other}'"),
        }
    }
}

async fn run_menu(session: &Session, lines: &mut StdinLines) -> anyhow::Result<()> {
    loop {
        print_menu(session);
        let Some(line) = lines.next_line().await? else {
            return Ok(()); // stdin closed
        };
        let Some(choice) = MenuChoice::parse(&line) else {
            println!("unrecognized option '{}'", line.trim());
            continue;
        };

        match choice {
            MenuChoice::Post => {
                prompt("message> ");
                let Some(message) = lines.next_line().await? else {
                    return Ok(());
                };
                let call = BoardCommand::Post(message.trim().to_string());
                report(session.dispatcher().call(call).await);
            }
            MenuChoice::TakeDown => {
                report(session.dispatcher().call(BoardCommand::TakeDown).await);
            }
            MenuChoice::ShowLedger => match session.ledger_snapshot().await {
                Ok(Some(snapshot)) => println!("{snapshot:#?}"),
                Ok(None) => println!("no contract state at {}", session.address()),
                Err(e) => println!("ledger read failed: {e}"),
            },
            MenuChoice::ShowPrivate => match session.private_state().await {
                // the secret itself stays local; show only derived facts
                Ok(private) => {
                    println!("poster commitment: {}", hex::encode(private.commitment()));
                    println!(
                        "cached witness: {}",
                        if private.witness.is_some() { "yes" } else { "no" }
                    );
                }
                Err(e) => println!("private state read failed: {e}"),
            },
            MenuChoice::ShowDerived => match session.pipeline().current() {
                Some(derived) => println!("{derived:#?}"),
                None => println!("no derived state yet"),
            },
            MenuChoice::Exit => return Ok(()),
        }
    }
}

fn report(result: bboard_client::Result<CallReceipt>) {
    match result {
        Ok(receipt) => println!(
            "'{}' accepted (tx {})",
            receipt.operation,
            hex::encode(&receipt.tx_hash[..8]),
        ),
        // a rejected call is reported, never fatal to the session
        Err(e) => println!("call failed: {e}"),
    }
}

fn print_menu(session: &Session) {
    println!("\nboard {}", session.address());
    println!("  1) post a message");
    println!("  2) take down the current post");
    println!("  3) show ledger state");
    println!("  4) show private state");
    println!("  5) show derived state");
    println!("  6) exit");
    prompt("> ");
}

fn prompt(text: &str) {
    print!("{text}");
    std::io::stdout().flush().ok();
}
