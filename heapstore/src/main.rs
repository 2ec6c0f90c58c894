//! heapstore - command-line access to paged heap files
//!
//! Every command binds a data file to the schema of a TOML table
//! definition, runs in one transaction and commits before exiting.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use heapstore_engine::{
    BufferPool, Field, HeapFile, PageCache, PageId, Permission, RecordId, TransactionId, Tuple,
};

mod table;

use table::TableDef;

/// heapstore - paged heap-file tuple storage
#[derive(Parser, Debug)]
#[command(name = "heapstore")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Table definition (TOML with [[fields]] entries)
    #[arg(short, long)]
    table: PathBuf,

    /// Page size in bytes (overrides the table definition)
    #[arg(short, long)]
    page_size: Option<usize>,

    /// Buffer pool size (number of pages)
    #[arg(short = 'c', long)]
    pool_pages: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty heap file
    Create { file: PathBuf },

    /// Insert one row, given as one value per field
    Insert { file: PathBuf, values: Vec<String> },

    /// Print every tuple with its record id
    Scan { file: PathBuf },

    /// Delete the tuple at PAGE:SLOT
    Delete { file: PathBuf, record: String },

    /// Show page and slot usage
    Stat { file: PathBuf },
}

fn parse_record_id(file: &HeapFile, raw: &str) -> Result<RecordId> {
    let Some((page, slot)) = raw.split_once(':') else {
        bail!("record id must be PAGE:SLOT, got {raw:?}");
    };
    let page_number: u32 = page.trim().parse().context("invalid page number")?;
    let slot: u16 = slot.trim().parse().context("invalid slot number")?;
    Ok(RecordId::new(PageId::new(file.id(), page_number), slot))
}

fn run(args: Args) -> Result<()> {
    let def = TableDef::load(&args.table)?;
    let schema = def.schema()?;

    let mut config = def.engine.clone();
    if let Some(page_size) = args.page_size {
        config.page_size = page_size;
    }
    if let Some(pool_pages) = args.pool_pages {
        config.pool_pages = pool_pages;
    }

    let pool = BufferPool::new(&config);
    let txn = TransactionId::new();

    match args.command {
        Command::Create { file } => {
            let heap = HeapFile::create(&file, schema.clone(), config.page_size)?;
            info!("Created {} (table {})", file.display(), heap.id());
            println!(
                "created {} ({}, {} slots per page)",
                file.display(),
                schema,
                heap.layout().slots
            );
        }

        Command::Insert { file, values } => {
            let heap = Arc::new(HeapFile::open(&file, schema.clone(), config.page_size)?);
            pool.register(heap.clone())?;

            if values.len() != schema.field_count() {
                bail!(
                    "expected {} values for ({}), got {}",
                    schema.field_count(),
                    schema,
                    values.len()
                );
            }
            let fields = schema
                .iter()
                .zip(&values)
                .map(|(desc, raw)| Field::parse(desc.field_type, raw))
                .collect::<Result<Vec<_>, _>>()?;

            let mut tuple = Tuple::new(schema.clone(), fields)?;
            heap.insert_tuple(txn, &pool, &mut tuple)?;
            pool.transaction_complete(txn, true)?;

            if let Some(record_id) = tuple.record_id() {
                println!("{record_id}");
            }
        }

        Command::Scan { file } => {
            let heap = Arc::new(HeapFile::open(&file, schema.clone(), config.page_size)?);
            pool.register(heap.clone())?;

            let mut scan = heap.scan(txn, &pool);
            scan.open()?;
            let mut count = 0usize;
            for tuple in scan.iter() {
                let tuple = tuple?;
                match tuple.record_id() {
                    Some(record_id) => println!("{record_id}\t{tuple}"),
                    None => println!("-\t{tuple}"),
                }
                count += 1;
            }
            scan.close();
            pool.transaction_complete(txn, true)?;
            info!("Scanned {} tuples", count);
        }

        Command::Delete { file, record } => {
            let heap = Arc::new(HeapFile::open(&file, schema.clone(), config.page_size)?);
            pool.register(heap.clone())?;

            let record_id = parse_record_id(&heap, &record)?;
            if record_id.page_id.page_number >= heap.page_count()? {
                bail!("page {} is beyond the end of {}", record_id.page_id.page_number, file.display());
            }
            let tuple = {
                let handle = pool.get_page(txn, record_id.page_id, Permission::ReadWrite)?;
                let page = handle.read();
                page.read_slot(record_id.slot)?
            };
            heap.delete_tuple(txn, &pool, &tuple)?;
            pool.transaction_complete(txn, true)?;
            println!("deleted {record_id}\t{tuple}");
        }

        Command::Stat { file } => {
            let heap = HeapFile::open(&file, schema.clone(), config.page_size)?;
            let layout = heap.layout();
            let page_count = heap.page_count()?;

            println!("file:        {}", file.display());
            println!("table id:    {}", heap.id());
            println!("schema:      {}", schema);
            println!("tuple size:  {} bytes", layout.tuple_size);
            println!("page size:   {} bytes", layout.page_size);
            println!("slots/page:  {}", layout.slots);
            println!("pages:       {}", page_count);

            let mut total = 0;
            for n in 0..page_count {
                let page = heap.read_page(PageId::new(heap.id(), n))?;
                let used = page.occupied_count();
                total += used;
                println!("  page {:>6}: {:>5}/{} used", n, used, layout.slots);
            }
            println!("tuples:      {}", total);
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    run(args)
}
