use crate::cli::Command;
use crate::error::{ErrorKind, Result};
use bytesize::ByteSize;
use dupeguard_config::Config;
use dupeguard_index::{
    Database, DuplicateGroup, FileRecord, GroupChange, GroupKey, HashKind, InboundDescriptor, InsertOutcome,
    KindStats, LinkGenerator, Maintenance, Reporter, Resolver, Store, Verdict,
};
use exn::ResultExt;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcDateTime};

pub async fn run(db: &Database, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Stats => stats(db).await.or_raise(|| ErrorKind::Command("stats")),
        Command::Groups { limit, offset, kind } => {
            let limit = config.listing.clamp(limit);
            groups(db, kind.into(), limit, offset).await.or_raise(|| ErrorKind::Command("groups"))
        },
        Command::Details { hash, kind } => details(db, hash, kind.into()).await.or_raise(|| ErrorKind::Command("details")),
        Command::Links { hash, kind } => {
            let generator = config.links.generator().or_raise(|| ErrorKind::Config)?;
            links(db, &generator, hash, kind.into()).await.or_raise(|| ErrorKind::Command("links"))
        },
        Command::Remove { remote_id } => remove(db, remote_id).await.or_raise(|| ErrorKind::Command("remove")),
        Command::Rebuild => rebuild(db).await.or_raise(|| ErrorKind::Command("rebuild")),
        Command::Verify => verify(db).await.or_raise(|| ErrorKind::Command("verify")),
        Command::Resolve(descriptor) => resolve(db, descriptor.into()).await.or_raise(|| ErrorKind::Command("resolve")),
        Command::Ingest { descriptor, local_path } => {
            ingest(db, descriptor.into(), local_path).await.or_raise(|| ErrorKind::Command("ingest"))
        },
    }
}

type IndexResult<T> = dupeguard_index::error::Result<T>;

async fn stats(db: &Database) -> IndexResult<()> {
    let reporter = Reporter::from(db);
    let stats = reporter.global_stats().await?;
    println!("Files:            {} ({})", stats.total_files, ByteSize(stats.total_size_bytes));
    println!("Without checksum: {}", stats.unhashed_files);
    println!("Duplicate groups: {}", stats.duplicate_group_count);
    println!("Duplicate files:  {}", stats.duplicate_file_count);
    println!("Wasted space:     {}", ByteSize(stats.wasted_bytes));
    println!("Efficiency:       {:.2}%", stats.efficiency_percent);
    for (kind, kind_stats) in &stats.by_kind {
        println!("{}", kind_line(*kind, kind_stats));
    }
    let sources = reporter.source_breakdown().await?;
    if !sources.is_empty() {
        println!("Sources:");
        for source in sources {
            println!("  {} {} files, {}", source.source_id, source.file_count, ByteSize(source.total_size_bytes));
        }
    }
    Ok(())
}

async fn groups(db: &Database, kind: HashKind, limit: usize, offset: usize) -> IndexResult<()> {
    let groups = Reporter::from(db).list_groups(kind, Some(limit), offset).await?;
    if groups.is_empty() {
        println!("No {kind} duplicate groups.");
        return Ok(());
    }
    for group in groups {
        print_group(&group);
    }
    Ok(())
}

async fn details(db: &Database, hash: String, kind: HashKind) -> IndexResult<()> {
    let group = match GroupKey::normalized(&hash, kind) {
        Some(key) => Store::from(db).group(&key).await?,
        None => None,
    };
    let Some(group) = group else {
        println!("No {kind} duplicate group for {}.", hash.trim());
        return Ok(());
    };
    print_group(&group);
    for record in Reporter::from(db).list_group_members(&group.hash_value, kind).await? {
        print_record(&record);
    }
    Ok(())
}

async fn links(db: &Database, generator: &LinkGenerator, hash: String, kind: HashKind) -> IndexResult<()> {
    let links = Reporter::from(db).list_group_links(&hash, kind, generator).await?;
    if links.is_empty() {
        println!("No {kind} duplicate group for {}.", hash.trim());
    }
    for link in links {
        let location = link.local_path.as_deref().unwrap_or("not transferred");
        println!("{}  {}  {}  [{}]", link.link, link.name, ByteSize(link.size_bytes), location);
    }
    Ok(())
}

async fn remove(db: &Database, remote_id: String) -> IndexResult<()> {
    let outcome = Maintenance::from(db).remove_record(&remote_id).await?;
    println!("Removed {} ({})", outcome.record.remote_id, outcome.record.name);
    match outcome.group {
        GroupChange::Unaffected => {},
        GroupChange::Shrunk(group) => {
            println!("Group {} {} now has {} members.", group.hash_kind, group.hash_value, group.member_count);
        },
        GroupChange::Dissolved(key) => println!("Group {} {} dissolved.", key.hash_kind, key.hash_value),
    }
    Ok(())
}

async fn rebuild(db: &Database) -> IndexResult<()> {
    let report = Maintenance::from(db).rebuild_all().await?;
    println!("Records scanned:  {}", report.records_scanned);
    println!("Records skipped:  {} (no checksum)", report.records_skipped);
    println!("Groups rebuilt:   {}", report.groups_rebuilt);
    println!("Groups created:   {}", report.groups_created);
    println!("Groups dropped:   {}", report.groups_dropped);
    println!("Groups repaired:  {}", report.groups_repaired);
    Ok(())
}

async fn verify(db: &Database) -> IndexResult<()> {
    let maintenance = Maintenance::from(db);
    let Err(err) = maintenance.check_consistency().await else {
        println!("Duplicate groups are consistent with the file records.");
        return Ok(());
    };
    if !matches!(*err, dupeguard_index::error::ErrorKind::Inconsistent(_)) {
        return Err(err);
    }
    for discrepancy in maintenance.verify_consistency().await? {
        println!("{discrepancy}");
    }
    println!("Run `dupeguard rebuild` to repair.");
    Err(err)
}

async fn resolve(db: &Database, descriptor: InboundDescriptor) -> IndexResult<()> {
    match Resolver::from(db).resolve(&descriptor).await? {
        Verdict::ExactMatch(record) => {
            println!("Already indexed:");
            print_record(&record);
        },
        Verdict::ContentMatch { records, kind } => {
            println!("Same content already indexed ({kind} checksum):");
            for record in &records {
                print_record(record);
            }
        },
        Verdict::NoMatch => println!("No match; proceed with the transfer."),
    }
    Ok(())
}

async fn ingest(db: &Database, descriptor: InboundDescriptor, local_path: Option<String>) -> IndexResult<()> {
    let mut record = descriptor.into_record(UtcDateTime::now());
    record.local_path = local_path;
    match Store::from(db).insert(&record).await? {
        InsertOutcome::Unhashed => println!("Indexed {} (no checksum, never grouped).", record.remote_id),
        InsertOutcome::Unique(key) => println!("Indexed {} ({} {}).", record.remote_id, key.hash_kind, key.hash_value),
        InsertOutcome::Formed(group) => {
            println!("Indexed {}; new duplicate group:", record.remote_id);
            print_group(&group);
        },
        InsertOutcome::Extended(group) => {
            println!("Indexed {}; joined duplicate group:", record.remote_id);
            print_group(&group);
        },
    }
    Ok(())
}

fn kind_line(kind: HashKind, stats: &KindStats) -> String {
    format!(
        "  {:<9} {} groups, {} extra copies, {} wasted",
        kind.as_str(),
        stats.group_count,
        stats.duplicate_file_count,
        ByteSize(stats.wasted_bytes)
    )
}

fn print_group(group: &DuplicateGroup) {
    println!(
        "{} {}  {} files, {} total, {} wasted, since {}",
        group.hash_kind,
        group.hash_value,
        group.member_count,
        ByteSize(group.total_size_bytes),
        ByteSize(group.wasted_bytes),
        timestamp(group.created_at)
    );
}

fn print_record(record: &FileRecord) {
    println!(
        "  {}  {}  {}  {}  {}",
        record.remote_id,
        record.name,
        ByteSize(record.size_bytes),
        record.source_id,
        timestamp(record.ingested_at)
    );
}

fn timestamp(at: UtcDateTime) -> String {
    OffsetDateTime::from(at).format(&Rfc3339).unwrap_or_else(|_| at.unix_timestamp().to_string())
}
