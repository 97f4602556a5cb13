use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::eyre::{Context, Result};

use wren_core::{AccountId, ChatId, ServerEvent};
use wren_worker::{SearchOptions, SyncOptions, WorkerConfig, WrenWorker};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .from_env_lossy()
                .add_directive("wren_cli=info".parse().unwrap())
                .add_directive("wren_worker=info".parse().unwrap())
                .add_directive("wren_engine=info".parse().unwrap())
                .add_directive("wren_store=info".parse().unwrap()),
        )
        .init();

    let host_dir = find_host_dir()?;
    let data_dir = resolve_data_dir()?;
    println!("📁 Automation host directory: {}", host_dir.display());

    let worker = Arc::new(
        WrenWorker::new(WorkerConfig { host_dir, data_dir })
            .await
            .wrap_err("Failed to create worker")?,
    );
    worker.start().await;

    let mut event_rx = worker.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            handle_event(event);
        }
    });

    loop {
        print_menu();
        let choice = read_line("Choice: ")?;

        match choice.trim() {
            "1" => list_accounts(&worker).await?,
            "2" => add_account(&worker).await?,
            "3" => switch_account(&worker).await?,
            "4" => list_chats(&worker).await?,
            "5" => sync_chats(&worker).await?,
            "6" => list_messages(&worker).await?,
            "7" => send_message(&worker).await?,
            "8" => search_messages(&worker).await?,
            "9" => logout(&worker).await?,
            "0" => {
                println!("👋 Shutting down...");
                worker.shutdown().await;
                break;
            }
            _ => println!("❌ Invalid choice"),
        }
    }

    Ok(())
}

fn print_menu() {
    println!();
    println!("╔════════════════════════════════════╗");
    println!("║        WREN - WhatsApp Deck        ║");
    println!("╠════════════════════════════════════╣");
    println!("║  1. List Accounts                  ║");
    println!("║  2. Add Account                    ║");
    println!("║  3. Switch Account (login)         ║");
    println!("║  4. List Chats                     ║");
    println!("║  5. Sync Chats                     ║");
    println!("║  6. List Messages                  ║");
    println!("║  7. Send Message                   ║");
    println!("║  8. Search Messages                ║");
    println!("║  9. Logout                         ║");
    println!("║  0. Exit                           ║");
    println!("╚════════════════════════════════════╝");
}

fn handle_event(event: ServerEvent) {
    match event {
        ServerEvent::Qr { payload } => {
            println!("\n📱 Scan this QR code with WhatsApp:");
            print_qr_code(&payload);
        }
        ServerEvent::Ready => {
            println!("\n✅ Session ready");
        }
        ServerEvent::Status { is_ready } => {
            if !is_ready {
                println!("\n⏳ Session not ready");
            }
        }
        ServerEvent::Disconnected { reason } => {
            println!("\n❌ Disconnected: {}", reason);
        }
        ServerEvent::SyncProgress {
            message, progress, ..
        } => {
            println!("   [{:>3}%] {}", progress, message);
        }
        ServerEvent::SyncComplete {
            total,
            success,
            errors,
        } => {
            println!(
                "\n✅ Sync complete: {} chats ({} updated, {} errors)",
                total, success, errors
            );
        }
        ServerEvent::NewMessage { chat_id, message } => {
            let direction = if message.from_me { "→" } else { "←" };
            println!(
                "\n💬 {} {}: {}",
                direction,
                chat_id,
                message.kind.preview(&message.body)
            );
        }
        ServerEvent::Error { message, .. } => {
            println!("\n❌ Error: {}", message);
        }
        _ => {}
    }
}

fn print_qr_code(qr: &str) {
    if let Err(e) = qr2term::print_qr(qr) {
        eprintln!("Failed to print QR code: {}", e);
        println!("Raw QR data: {}", qr);
    }
}

async fn list_accounts(worker: &Arc<WrenWorker>) -> Result<()> {
    let accounts = worker.get_accounts(None).await;

    println!("\n📋 Accounts:");
    for account in accounts {
        let active = if account.is_active { "⭐" } else { "  " };
        println!(
            "  {} {} - {} {}",
            active,
            account.id,
            account.name,
            account.phone.unwrap_or_default()
        );
    }
    Ok(())
}

async fn add_account(worker: &Arc<WrenWorker>) -> Result<()> {
    let name = read_line("Account name: ")?;
    match worker.add_account(name.trim(), None).await {
        Ok(account) => println!("✅ Created account: {} ({})", account.name, account.id),
        Err(e) => println!("❌ {}", e),
    }
    Ok(())
}

async fn switch_account(worker: &Arc<WrenWorker>) -> Result<()> {
    let id = read_line("Account ID to switch to: ")?;
    match worker.switch_account(&AccountId::from(id.trim())).await {
        Ok(()) => println!("🔄 Switching to {}... watch for the QR code", id.trim()),
        Err(e) => println!("❌ {}", e),
    }
    Ok(())
}

async fn list_chats(worker: &Arc<WrenWorker>) -> Result<()> {
    let chats = match worker.get_chats().await {
        Ok(chats) => chats,
        Err(e) => {
            println!("❌ {}", e);
            return Ok(());
        }
    };

    if chats.is_empty() {
        println!("📭 No chats cached yet. Try a sync first.");
    } else {
        println!("\n💬 Chats ({}):", chats.len());
        for chat in chats.iter().take(20) {
            let unread = if chat.unread_count > 0 {
                format!(" ({} unread)", chat.unread_count)
            } else {
                String::new()
            };
            let preview = chat
                .last_message
                .as_ref()
                .map(|m| m.body.as_str())
                .unwrap_or("");
            println!("  {} {}{} - {}", chat.id, chat.name, unread, preview);
        }
        if chats.len() > 20 {
            println!("  ... and {} more", chats.len() - 20);
        }
    }
    Ok(())
}

async fn sync_chats(worker: &Arc<WrenWorker>) -> Result<()> {
    let cap = read_line("Max chats (empty for all): ")?;
    let max_chats = cap.trim().parse::<usize>().ok();
    match worker
        .start_sync(SyncOptions {
            max_chats,
            incremental: false,
        })
        .await
    {
        Ok(()) => println!("⏳ Sync started, progress will stream below"),
        Err(e) => println!("❌ {}", e),
    }
    Ok(())
}

async fn list_messages(worker: &Arc<WrenWorker>) -> Result<()> {
    let chat_id = read_line("Chat ID: ")?;
    let messages = match worker
        .get_messages(&ChatId::from(chat_id.trim()), 20)
        .await
    {
        Ok(messages) => messages,
        Err(e) => {
            println!("❌ {}", e);
            return Ok(());
        }
    };

    if messages.is_empty() {
        println!("📭 No messages found");
    } else {
        println!("\n💬 Messages ({}):", messages.len());
        for msg in messages {
            let direction = if msg.from_me { "→" } else { "←" };
            println!(
                "  {} {}: {}",
                direction,
                msg.sender_name.as_deref().unwrap_or(&msg.sender),
                msg.kind.preview(&msg.body)
            );
        }
    }
    Ok(())
}

async fn send_message(worker: &Arc<WrenWorker>) -> Result<()> {
    let chat_id = read_line("To (chat ID): ")?;
    let text = read_line("Message: ")?;

    match worker.send_message(chat_id.trim(), text.trim()).await {
        Ok(_) => println!("📤 Message sent!"),
        Err(e) => println!("❌ {}", e),
    }
    Ok(())
}

async fn search_messages(worker: &Arc<WrenWorker>) -> Result<()> {
    let query = read_line("Search for: ")?;

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel(64);
    tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            if let ServerEvent::SearchProgress { current, index, total } = event {
                println!("   Searching {}/{}: {}", index + 1, total, current);
            }
        }
    });

    let hits = match worker
        .search_messages(
            query.trim(),
            SearchOptions {
                max_chats: 20,
                max_messages_per_chat: 50,
            },
            &progress_tx,
        )
        .await
    {
        Ok(hits) => hits,
        Err(e) => {
            println!("❌ {}", e);
            return Ok(());
        }
    };

    if hits.is_empty() {
        println!("📭 No matches");
    } else {
        println!("\n🔍 Matches ({}):", hits.len());
        for hit in hits.iter().take(20) {
            println!("  [{}] {}", hit.chat_name, hit.message.body);
        }
    }
    Ok(())
}

async fn logout(worker: &Arc<WrenWorker>) -> Result<()> {
    match worker.logout().await {
        Ok(()) => println!("🚪 Logged out"),
        Err(e) => println!("❌ {}", e),
    }
    Ok(())
}

fn read_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn resolve_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("WREN_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let dirs = directories::ProjectDirs::from("dev", "wren", "wren")
        .ok_or_else(|| color_eyre::eyre::eyre!("Could not resolve a data directory"))?;
    Ok(dirs.data_dir().to_path_buf())
}

fn find_host_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("WREN_HOST_DIR") {
        let dir = PathBuf::from(dir);
        if dir.join("package.json").exists() {
            return Ok(dir);
        }
    }

    let exe_path = std::env::current_exe()?;
    let mut current = exe_path.parent();
    while let Some(dir) = current {
        let host = dir.join("host");
        if host.join("package.json").exists() {
            return Ok(host);
        }
        current = dir.parent();
    }

    let cwd = std::env::current_dir()?;
    let host = cwd.join("host");
    if host.join("package.json").exists() {
        return Ok(host);
    }

    Err(color_eyre::eyre::eyre!(
        "Could not find the automation host directory. Run from the project root or set WREN_HOST_DIR."
    ))
}
