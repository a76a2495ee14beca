use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use log::{error, info};
use mimalloc::MiMalloc;
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use wordprofile::query::{
    ConcordanceRequest, DiffOperation, DiffRequest, MweRequest, OrderBy, QueryEngine,
    RelationSelector, RelationsRequest,
};
use wordprofile::{ExtractConfig, Relation, Tag, pipeline, storage};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
    /// Produce compact JSON output
    #[arg(long, global = true)]
    compact: bool,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand)]
enum Command {
    /// Extract collocations from CoNLL-U files into bulk-load files
    Extract {
        /// Input files or glob patterns (.conllu, optionally gzipped)
        #[arg(required = true)]
        inputs: Vec<String>,
        /// Output directory for the bulk-load files
        #[arg(short, long)]
        out: PathBuf,
        /// Settings file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Worker threads, overriding the settings file
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Rebuild the database from a directory of bulk-load files
    Load {
        /// Directory written by `extract`
        data: PathBuf,
        #[arg(long)]
        db: PathBuf,
    },
    /// Look up a lemma's tags, frequencies and relations
    Lemma {
        lemma: String,
        #[arg(short, long)]
        tag: Option<Tag>,
        #[arg(long)]
        db: PathBuf,
    },
    /// Collocations of a lemma, per relation
    Relations {
        lemma: String,
        tag: Tag,
        /// Relation views such as OBJ, ~OBJ or META; default all
        #[arg(short, long = "relation")]
        relations: Vec<RelationSelector>,
        #[arg(long, default_value_t = 0)]
        start: usize,
        #[command(flatten)]
        ranking: Ranking,
        #[arg(long)]
        db: PathBuf,
    },
    /// Compare the profiles of two lemmas
    Diff {
        lemma1: String,
        lemma2: String,
        tag: Tag,
        #[arg(short, long = "relation")]
        relations: Vec<RelationSelector>,
        #[arg(long, default_value = "adiff")]
        operation: DiffOperation,
        /// Only collocates shared by both lemmas
        #[arg(long)]
        intersection: bool,
        /// Only the top N collocates of each lemma take part (0: all)
        #[arg(long, default_value_t = 0)]
        nbest: usize,
        #[command(flatten)]
        ranking: Ranking,
        #[arg(long)]
        db: PathBuf,
    },
    /// MWEs extending the given collocations
    Mwe {
        #[arg(required = true)]
        ids: Vec<i64>,
        #[arg(short, long = "relation")]
        relations: Vec<Relation>,
        #[arg(long, default_value_t = 0)]
        start: usize,
        #[command(flatten)]
        ranking: Ranking,
        #[arg(long)]
        db: PathBuf,
    },
    /// Example sentences for a collocation or MWE
    Concord {
        id: i64,
        /// Treat the id as an MWE id
        #[arg(long)]
        mwe: bool,
        /// Include the neighbouring sentences
        #[arg(long)]
        context: bool,
        #[arg(long, default_value_t = 0)]
        start: usize,
        #[arg(short, long, default_value_t = 20)]
        number: usize,
        #[arg(long)]
        db: PathBuf,
    },
}

#[derive(ClapArgs)]
struct Ranking {
    #[arg(short, long, default_value_t = 20)]
    number: usize,
    #[arg(long, default_value = "log_dice")]
    order_by: OrderBy,
    #[arg(long, default_value_t = 0)]
    min_freq: u64,
    #[arg(long, default_value_t = -1000.0, allow_negative_numbers = true)]
    min_stat: f64,
}

fn write_json<T: Serialize>(value: &T, compact: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if compact {
        serde_json::to_writer(&mut out, value)?;
    } else {
        serde_json::to_writer_pretty(&mut out, value)?;
    }
    writeln!(out)?;
    Ok(())
}

fn engine(db: &Path) -> Result<QueryEngine> {
    QueryEngine::open(db).with_context(|| format!("cannot open {}", db.display()))
}

fn run_extract(inputs: &[String], out: &Path, config: Option<&Path>, workers: Option<usize>, compact: bool) -> Result<()> {
    let mut config = match config {
        Some(path) => ExtractConfig::load(path)?,
        None => ExtractConfig::default(),
    };
    if let Some(workers) = workers {
        config.workers = workers;
    }
    config.validate()?;
    let tables = match &config.patterns {
        Some(path) => wordprofile::load_tables(path)
            .with_context(|| format!("cannot load patterns {}", path.display()))?,
        None => wordprofile::default_tables()?,
    };
    let inputs = pipeline::input_paths(inputs)?;
    let summary = pipeline::extract(&config, &tables, &inputs, out)?;
    info!(
        "{} collocations and {} MWEs from {} sentences",
        summary.collocations, summary.mwes, summary.sentences
    );
    write_json(&summary, compact)
}

fn process(args: &Args) -> Result<()> {
    match &args.command {
        Command::Extract {
            inputs,
            out,
            config,
            workers,
        } => run_extract(inputs, out, config.as_deref(), *workers, args.compact),
        Command::Load { data, db } => {
            let summary = storage::rebuild(db, data)?;
            for (table, rows) in &summary.tables {
                info!("{table}: {rows} rows");
            }
            Ok(())
        }
        Command::Lemma { lemma, tag, db } => {
            let result = engine(db)?.get_lemma_and_pos(lemma, *tag)?;
            write_json(&result, args.compact)
        }
        Command::Relations {
            lemma,
            tag,
            relations,
            start,
            ranking,
            db,
        } => {
            let req = RelationsRequest {
                relations: relations.clone(),
                start: *start,
                number: ranking.number,
                order_by: ranking.order_by,
                min_freq: ranking.min_freq,
                min_stat: ranking.min_stat,
                ..RelationsRequest::new(lemma, *tag)
            };
            write_json(&engine(db)?.get_relations(&req)?, args.compact)
        }
        Command::Diff {
            lemma1,
            lemma2,
            tag,
            relations,
            operation,
            intersection,
            nbest,
            ranking,
            db,
        } => {
            let req = DiffRequest {
                relations: relations.clone(),
                number: ranking.number,
                order_by: ranking.order_by,
                min_freq: ranking.min_freq,
                min_stat: ranking.min_stat,
                operation: *operation,
                use_intersection: *intersection,
                nbest: *nbest,
                ..DiffRequest::new(lemma1, lemma2, *tag)
            };
            write_json(&engine(db)?.get_diff(&req)?, args.compact)
        }
        Command::Mwe {
            ids,
            relations,
            start,
            ranking,
            db,
        } => {
            let req = MweRequest {
                relations: relations.clone(),
                start: *start,
                number: ranking.number,
                order_by: ranking.order_by,
                min_freq: ranking.min_freq,
                min_stat: ranking.min_stat,
                ..MweRequest::new(ids.clone())
            };
            write_json(&engine(db)?.get_mwe_relations(&req)?, args.compact)
        }
        Command::Concord {
            id,
            mwe,
            context,
            start,
            number,
            db,
        } => {
            let req = ConcordanceRequest {
                use_context: *context,
                start: *start,
                number: *number,
                ..ConcordanceRequest::new(*id)
            };
            let engine = engine(db)?;
            let result = if *mwe {
                engine.get_mwe_concordances(&req)?
            } else {
                engine.get_concordances(&req)?
            };
            write_json(&result, args.compact)
        }
    }
}

fn main() {
    let args = Args::parse();
    pretty_env_logger::formatted_timed_builder()
        .filter_level(args.verbose.log_level_filter())
        .init();
    if let Err(e) = process(&args) {
        error!("{e:#}");
        process::exit(1);
    }
}
