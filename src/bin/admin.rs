use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use uuid::Uuid;

use gatehouse::auth::{Role, TenantGuard};
use gatehouse::domain::{normalize_plate, Amenity, Operator, Resident, TenantId, Worker};
use gatehouse::infra::{DirectoryStore, PgGateStore, SqliteGateStore};

fn print_help() {
    eprintln!(
        "\
gatehouse-admin

USAGE:
  gatehouse-admin <command> [options]

COMMANDS:
  migrate                         Run database migrations
  issue-token                     Sign a bearer credential for a resident, operator or device
  seed-amenity                    Create or update an amenity
  seed-resident                   Create or update a resident
  seed-worker                     Create or update a worker
  seed-operator                   Create or update an operator

COMMON OPTIONS:
  --database-url <url>            postgres://… or sqlite:… (defaults to env DATABASE_URL)

issue-token OPTIONS:
  --kind <resident|operator|device> (required)
  --subject <uuid>                (required)
  --tenant <uuid>                 (required for resident and device)
  --ttl-hours <n>                 (default: 24)
  --secret <s>                    (defaults to env <KIND>_TOKEN_SECRET)
  --issuer <s>                    (defaults to env TOKEN_ISSUER or gatehouse)
  --audience <s>                  (defaults to env TOKEN_AUDIENCE or gatehouse-api)

seed-amenity OPTIONS:
  --tenant <uuid>                 (required)
  --name <s>                      (required)
  --capacity <n>                  (default: 10)
  --closed                        (mark not operational)
  --id <uuid>                     (default: random)

seed-resident OPTIONS:
  --tenant <uuid>                 (required)
  --name <s>                      (required)
  --unit <s>                      (optional)
  --plate <s>                     (repeatable)
  --id <uuid>                     (default: random)

seed-worker OPTIONS:
  --tenant <uuid>                 (required)
  --name <s>                      (required)
  --department <s>                (optional)
  --id <uuid>                     (default: random)

seed-operator OPTIONS:
  --name <s>                      (required)
  --tenant <uuid>                 (optional; unlinked operators cannot authenticate)
  --id <uuid>                     (default: random)
"
    );
}

fn require_database_url(database_url: Option<String>) -> anyhow::Result<String> {
    database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required (or pass --database-url)"))
}

fn next_value(args: &mut VecDeque<String>, flag: &str) -> anyhow::Result<String> {
    args.pop_front()
        .ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))
}

fn next_uuid(args: &mut VecDeque<String>, flag: &str) -> anyhow::Result<Uuid> {
    let raw = next_value(args, flag)?;
    Uuid::parse_str(&raw).map_err(|e| anyhow::anyhow!("invalid {flag} {raw:?}: {e}"))
}

/// Open the store named by the URL and apply migrations.
async fn open_directory(database_url: &str) -> anyhow::Result<Arc<dyn DirectoryStore>> {
    if database_url.starts_with("sqlite:") {
        let options =
            SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = SqliteGateStore::new(pool);
        store.initialize().await?;
        Ok(Arc::new(store))
    } else {
        let store = PgGateStore::from_url(database_url, 5).await?;
        store.initialize().await?;
        Ok(Arc::new(store))
    }
}

/// Flags shared by the seed commands
#[derive(Default)]
struct SeedArgs {
    database_url: Option<String>,
    id: Option<Uuid>,
    tenant: Option<Uuid>,
    name: Option<String>,
    capacity: Option<i32>,
    closed: bool,
    unit: Option<String>,
    plates: Vec<String>,
    department: Option<String>,
}

impl SeedArgs {
    /// Returns `None` when help was requested.
    fn parse(args: &mut VecDeque<String>) -> anyhow::Result<Option<Self>> {
        let mut seed = SeedArgs::default();
        while let Some(arg) = args.pop_front() {
            match arg.as_str() {
                "--database-url" => seed.database_url = Some(next_value(args, &arg)?),
                "--id" => seed.id = Some(next_uuid(args, &arg)?),
                "--tenant" => seed.tenant = Some(next_uuid(args, &arg)?),
                "--name" => seed.name = Some(next_value(args, &arg)?),
                "--capacity" => seed.capacity = Some(next_value(args, &arg)?.parse()?),
                "--closed" => seed.closed = true,
                "--unit" => seed.unit = Some(next_value(args, &arg)?),
                "--plate" => seed.plates.push(next_value(args, &arg)?),
                "--department" => seed.department = Some(next_value(args, &arg)?),
                "-h" | "--help" => return Ok(None),
                other => anyhow::bail!("unexpected argument: {other}"),
            }
        }
        Ok(Some(seed))
    }

    fn tenant(&self) -> anyhow::Result<TenantId> {
        self.tenant
            .map(TenantId::from_uuid)
            .ok_or_else(|| anyhow::anyhow!("--tenant is required"))
    }

    fn name(&self) -> anyhow::Result<String> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("--name is required"))
    }

    fn id(&self) -> Uuid {
        self.id.unwrap_or_else(Uuid::new_v4)
    }

    async fn directory(&self) -> anyhow::Result<Arc<dyn DirectoryStore>> {
        open_directory(&require_database_url(self.database_url.clone())?).await
    }
}

fn issue_token(args: &mut VecDeque<String>) -> anyhow::Result<()> {
    let mut kind: Option<Role> = None;
    let mut subject: Option<Uuid> = None;
    let mut tenant: Option<Uuid> = None;
    let mut ttl_hours: i64 = 24;
    let mut secret: Option<String> = None;
    let mut issuer = std::env::var("TOKEN_ISSUER").unwrap_or_else(|_| "gatehouse".to_string());
    let mut audience =
        std::env::var("TOKEN_AUDIENCE").unwrap_or_else(|_| "gatehouse-api".to_string());

    while let Some(arg) = args.pop_front() {
        match arg.as_str() {
            "--kind" => kind = Some(next_value(args, &arg)?.parse()?),
            "--subject" => subject = Some(next_uuid(args, &arg)?),
            "--tenant" => tenant = Some(next_uuid(args, &arg)?),
            "--ttl-hours" => ttl_hours = next_value(args, &arg)?.parse()?,
            "--secret" => secret = Some(next_value(args, &arg)?),
            "--issuer" => issuer = next_value(args, &arg)?,
            "--audience" => audience = next_value(args, &arg)?,
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            other => anyhow::bail!("unexpected argument: {other}"),
        }
    }

    let kind = kind.ok_or_else(|| anyhow::anyhow!("--kind is required"))?;
    let subject = subject.ok_or_else(|| anyhow::anyhow!("--subject is required"))?;
    if ttl_hours <= 0 {
        anyhow::bail!("--ttl-hours must be positive");
    }
    if tenant.is_none() && kind != Role::Operator {
        anyhow::bail!("--tenant is required for {kind} credentials");
    }

    let secret_var = format!("{}_TOKEN_SECRET", kind.as_str().to_ascii_uppercase());
    let secret = secret
        .or_else(|| std::env::var(&secret_var).ok())
        .ok_or_else(|| anyhow::anyhow!("{secret_var} is required (or pass --secret)"))?;

    let guard = TenantGuard::new(&issuer, &audience).with_secret(kind, secret.as_bytes());
    let token = guard.issue(
        kind,
        subject,
        tenant.map(TenantId::from_uuid),
        chrono::Duration::hours(ttl_hours),
    )?;
    println!("{token}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args: VecDeque<String> = std::env::args().skip(1).collect();
    let Some(command) = args.pop_front() else {
        print_help();
        return Ok(());
    };

    if matches!(command.as_str(), "-h" | "--help" | "help") {
        print_help();
        return Ok(());
    }

    match command.as_str() {
        "migrate" => {
            let mut database_url: Option<String> = None;
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => database_url = Some(next_value(&mut args, &arg)?),
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let database_url = require_database_url(database_url)?;
            open_directory(&database_url).await?;
            println!("ok: migrations applied");
            Ok(())
        }
        "issue-token" => issue_token(&mut args),
        "seed-amenity" | "seed-resident" | "seed-worker" | "seed-operator" => {
            let Some(seed) = SeedArgs::parse(&mut args)? else {
                print_help();
                return Ok(());
            };
            let id = seed.id();

            match command.as_str() {
                "seed-amenity" => {
                    let capacity = seed.capacity.unwrap_or(10);
                    if capacity < 1 {
                        anyhow::bail!("--capacity must be at least 1");
                    }
                    let amenity = Amenity {
                        id,
                        tenant_id: seed.tenant()?,
                        name: seed.name()?,
                        capacity,
                        operational: !seed.closed,
                    };
                    seed.directory().await?.upsert_amenity(&amenity).await?;
                }
                "seed-resident" => {
                    let vehicle_plates = seed
                        .plates
                        .iter()
                        .map(|raw| {
                            normalize_plate(raw)
                                .ok_or_else(|| anyhow::anyhow!("invalid --plate {raw:?}"))
                        })
                        .collect::<anyhow::Result<Vec<_>>>()?;
                    let resident = Resident {
                        id,
                        tenant_id: seed.tenant()?,
                        name: seed.name()?,
                        unit: seed.unit.clone(),
                        vehicle_plates,
                    };
                    seed.directory().await?.upsert_resident(&resident).await?;
                }
                "seed-worker" => {
                    let worker = Worker {
                        id,
                        tenant_id: seed.tenant()?,
                        name: seed.name()?,
                        department: seed.department.clone(),
                    };
                    seed.directory().await?.upsert_worker(&worker).await?;
                }
                _ => {
                    let operator = Operator {
                        id,
                        tenant_id: seed.tenant.map(TenantId::from_uuid),
                        name: seed.name()?,
                    };
                    seed.directory().await?.upsert_operator(&operator).await?;
                }
            }

            println!("ok: {command} {id}");
            Ok(())
        }
        other => {
            print_help();
            anyhow::bail!("unknown command: {other}")
        }
    }
}
