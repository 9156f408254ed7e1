use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use server_api::JwtIdentityProvider;
use shared::domain::{MessageId, Principal, UserId};
use storage::{NewAccount, Storage};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/chat.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mirror an identity-provider account into the chat database.
    CreateAccount {
        username: String,
        #[arg(long)]
        firstname: Option<String>,
        #[arg(long)]
        lastname: Option<String>,
        #[arg(long)]
        admin: bool,
    },
    /// Create the shared lobby conversation; set LOBBY_CONVERSATION_ID to the printed id.
    ProvisionLobby { owner_user_id: i64 },
    /// Hide a message from history.
    DeleteMessage { message_id: i64 },
    /// Mint a development bearer token for an existing account.
    MintToken {
        user_id: i64,
        #[arg(long, env = "JWT_SECRET")]
        jwt_secret: String,
        #[arg(long, default_value_t = 24)]
        ttl_hours: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url)
        .await
        .with_context(|| format!("failed to open {}", cli.database_url))?;

    match cli.command {
        Command::CreateAccount {
            username,
            firstname,
            lastname,
            admin,
        } => {
            let user_id = storage
                .upsert_account(NewAccount {
                    username: &username,
                    firstname: firstname.as_deref(),
                    lastname: lastname.as_deref(),
                    is_admin: admin,
                })
                .await?;
            println!("account user_id={user_id}");
        }
        Command::ProvisionLobby { owner_user_id } => {
            let owner = UserId(owner_user_id);
            if !storage.account_exists(owner).await? {
                bail!("no account with id {owner_user_id}");
            }
            let conversation_id = storage.create_lobby(owner).await?;
            println!("created lobby conversation_id={conversation_id}");
        }
        Command::DeleteMessage { message_id } => {
            if storage.soft_delete_message(MessageId(message_id)).await? {
                println!("deleted message_id={message_id}");
            } else {
                bail!("message {message_id} not found or already deleted");
            }
        }
        Command::MintToken {
            user_id,
            jwt_secret,
            ttl_hours,
        } => {
            let account = storage
                .load_account(UserId(user_id))
                .await?
                .with_context(|| format!("no account with id {user_id}"))?;
            let principal = Principal {
                account_id: account.id,
                username: account.username,
                firstname: account.firstname,
                lastname: account.lastname,
                is_admin: account.is_admin,
            };
            let ttl = chrono::Duration::try_hours(ttl_hours).context("ttl_hours out of range")?;
            let token = JwtIdentityProvider::new(&jwt_secret).issue(&principal, ttl)?;
            println!("{token}");
        }
    }

    Ok(())
}
