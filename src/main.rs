use std::path::{Path, PathBuf};

use pac_bootctl_common::{flag, BootCtlError, Tier};
use pac_bootctl_controller::{run_boot_sequence, ProcessRebooter, RuntimeMonitor};
use pac_bootctl_health::{HealthReport, RealProbes};
use pac_bootctl_journal::{flags, retry, JournalHandle};
use pac_bootctl_policy::PolicyConfig;
use tokio_util::sync::CancellationToken;

const DEFAULT_JOURNAL_PATH: &str = "/var/lib/pac-bootctl/journal.bin";
const DEFAULT_HEALTH_PATH: &str = "/var/lib/pac-bootctl/health.json";
const DEFAULT_POLICY_PATH: &str = "/etc/pac-bootctl/policy.toml";

/// Attestation sits outside the core's scope (§6.3) — nonce, TPM quote, and
/// token layout are an external collaborator's concern. This binary supplies
/// a null procedure that always passes, so `run-boot`/`run-monitor` are
/// runnable out of the box; a real deployment links a production
/// implementation of `AttestationProcedure` in its place.
struct NullAttestation;

impl pac_bootctl_policy::AttestationProcedure for NullAttestation {
    fn attest(&self) -> pac_bootctl_policy::AttestationOutcome {
        pac_bootctl_policy::AttestationOutcome::Pass
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    let journal_path = parse_flag_string(&args, "--journal").unwrap_or_else(|| DEFAULT_JOURNAL_PATH.to_string());
    let journal_path = PathBuf::from(journal_path);

    let cmd = args.get(1).map(|s| s.as_str()).unwrap_or("");

    let code = match run(cmd, &args, &journal_path).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            exit_code_for(&e)
        }
    };

    std::process::exit(code);
}

async fn run(cmd: &str, args: &[String], journal_path: &Path) -> anyhow::Result<i32> {
    match cmd {
        "init" => {
            let mut handle = JournalHandle::open_or_init(journal_path)?;
            print_record(&handle.read()?);
            Ok(0)
        }
        "read" => {
            let mut handle = JournalHandle::open_or_init(journal_path)?;
            print_record(&handle.read()?);
            Ok(0)
        }
        "set-tier" => {
            let Some(tier) = args.get(2).and_then(|v| v.parse::<u8>().ok()).and_then(Tier::from_u8) else {
                eprintln!("Usage: pac-bootctl set-tier <1|2|3>");
                return Ok(1);
            };
            let mut handle = JournalHandle::open_or_init(journal_path)?;
            let mut record = handle.read()?;
            record.tier = tier;
            handle.write(&record)?;
            Ok(0)
        }
        "dec-tries" => {
            let Some(tier) = args.get(2).and_then(|v| v.parse::<u8>().ok()).and_then(Tier::from_u8) else {
                eprintln!("Usage: pac-bootctl dec-tries <2|3>");
                return Ok(1);
            };
            let mut handle = JournalHandle::open_or_init(journal_path)?;
            let record = handle.read()?;
            let record = retry::decrement(record, tier)?;
            handle.write(&record)?;
            Ok(0)
        }
        "reset-tries" => {
            let mut handle = JournalHandle::open_or_init(journal_path)?;
            let record = handle.read()?;
            let record = retry::reset(record);
            handle.write(&record)?;
            Ok(0)
        }
        "set-flag" | "clear-flag" => {
            let Some(bit) = args.get(2).and_then(|name| flag::name_to_bit(name)) else {
                eprintln!("Usage: pac-bootctl {cmd} <emergency|quarantine|brownout|dirty|network_gated>");
                return Ok(1);
            };
            let mut handle = JournalHandle::open_or_init(journal_path)?;
            let record = handle.read()?;
            let record = if cmd == "set-flag" {
                flags::set(record, bit)
            } else {
                flags::clear(record, bit)
            };
            handle.write(&record)?;
            Ok(0)
        }
        "inc-boot" => {
            let mut handle = JournalHandle::open_or_init(journal_path)?;
            let mut record = handle.read()?;
            record.boot_count = record.boot_count.saturating_add(1);
            handle.write(&record)?;
            Ok(0)
        }
        "run-boot" => {
            let cfg = load_policy(args);
            let health_path = parse_flag_string(args, "--health").unwrap_or_else(|| DEFAULT_HEALTH_PATH.to_string());
            let health = HealthReport::load(Path::new(&health_path));
            let probes = real_probes(args);
            let attestation = NullAttestation;

            let mut handle = JournalHandle::open_or_init(journal_path)?;
            let outcome = run_boot_sequence(&mut handle, &health, &probes, &attestation, &cfg)?;
            tracing::info!(?outcome, "boot sequence complete");
            println!("{outcome:?}");
            Ok(0)
        }
        "run-monitor" => {
            let cfg = load_policy(args);
            let health_path = parse_flag_string(args, "--health").unwrap_or_else(|| DEFAULT_HEALTH_PATH.to_string());
            let probes = real_probes(args);
            let attestation = NullAttestation;
            let rebooter = ProcessRebooter;
            let mut monitor = RuntimeMonitor::new(
                journal_path.to_path_buf(),
                PathBuf::from(health_path),
                &probes,
                &attestation,
                &rebooter,
                cfg,
            );

            let shutdown = CancellationToken::new();
            let signal_shutdown = shutdown.clone();
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                signal_shutdown.cancel();
            });

            monitor.run(shutdown).await?;
            Ok(0)
        }
        _ => {
            eprintln!("Usage: pac-bootctl [--journal <path>] <command> [args...]");
            eprintln!("Commands:");
            eprintln!("  init                              create the journal if absent, print the record");
            eprintln!("  read                               pretty-print the record");
            eprintln!("  set-tier <1|2|3>                   write the tier field");
            eprintln!("  dec-tries <2|3>                    saturating decrement of a retry budget");
            eprintln!("  reset-tries                        restore both retry budgets to default");
            eprintln!("  set-flag <name> / clear-flag <name> manipulate the flag bitset");
            eprintln!("  inc-boot                           increment boot_count");
            eprintln!("  run-boot [--health <path>]         run one boot-time tier-ladder pass");
            eprintln!("  run-monitor [--health <path>]      run the runtime monitor loop until Ctrl-C");
            Ok(1)
        }
    }
}

fn real_probes(args: &[String]) -> RealProbes {
    let verifier_addr = parse_flag_string(args, "--verifier").unwrap_or_else(|| "127.0.0.1:9443".to_string());
    let network_target_addr = parse_flag_string(args, "--network-target").unwrap_or_else(|| "1.1.1.1:443".to_string());
    RealProbes {
        verifier_addr,
        network_target_addr,
        tier_root_paths: vec![
            (Tier::Two, PathBuf::from("/boot/tier2-root.img")),
            (Tier::Three, PathBuf::from("/boot/tier3-root.img")),
        ],
    }
}

fn load_policy(args: &[String]) -> PolicyConfig {
    let path = parse_flag_string(args, "--policy").unwrap_or_else(|| DEFAULT_POLICY_PATH.to_string());
    match std::fs::read_to_string(&path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(path = %path, error = %e, "malformed policy config, using defaults");
            PolicyConfig::default()
        }),
        Err(_) => PolicyConfig::default(),
    }
}

fn print_record(record: &pac_bootctl_common::BootRecord) {
    println!("tier:              {}", record.tier);
    println!("boot_count:        {}", record.boot_count);
    println!("tries_t2:          {}", record.tries_t2);
    println!("tries_t3:          {}", record.tries_t3);
    println!("rollback_idx:      {}", record.rollback_idx);
    println!("timestamp:         {}", record.timestamp);
    println!("emergency:         {}", record.flags.test(flag::EMERGENCY));
    println!("quarantine:        {}", record.flags.test(flag::QUARANTINE));
    println!("brownout:          {}", record.flags.test(flag::BROWNOUT));
    println!("dirty:             {}", record.flags.test(flag::DIRTY));
    println!("network_gated:     {}", record.flags.test(flag::NETWORK_GATED));
    println!("brownout_since:    {}", record.brownout_since_boot);
}

fn exit_code_for(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<BootCtlError>() {
        Some(BootCtlError::Io(_)) => 2,
        Some(BootCtlError::Fatal(_)) => 2,
        Some(_) => 1,
        None => 1,
    }
}

fn parse_flag_string(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1)).map(|v| v.clone())
}
