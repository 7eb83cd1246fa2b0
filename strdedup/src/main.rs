use clap::{Parser as ClapParser, ValueEnum};
use std::process;

use heapscan::{Arena, MemoryError, PointerWidth};
use strdedup::sim::{
    HeapBuilder, SegmentId, Series, SimulatedRuntime, TypeLayout,
};
use strdedup::{
    PassOutcome, Profiler, ProfilerCreateInfo, SuspendReason, TriggerMode,
    TypeFlags,
};

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Trigger {
    /// Run on the collection-started notification
    Collection,
    /// Run once a suspend for collection completes
    Suspend,
}

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Distinct string values in the simulated heap
    #[arg(long, default_value_t = 16)]
    distinct: usize,

    /// Old-generation copies of each value
    #[arg(long, default_value_t = 4)]
    copies: usize,

    /// Add one young copy of each value
    #[arg(long, help = "Also reference a young copy of every value")]
    young: bool,

    /// Reference every copy from a frozen segment too
    #[arg(long, help = "Add a frozen segment referencing the copies")]
    frozen: bool,

    /// Pointer width of the simulated process (32 or 64)
    #[arg(long, default_value = "64", value_parser = parse_width)]
    width: PointerWidth,

    #[arg(long, value_enum, default_value_t = Trigger::Collection)]
    trigger: Trigger,

    /// Number of collections to simulate
    #[arg(long, default_value_t = 2)]
    passes: usize,

    #[arg(short, long, help = "Log at debug level")]
    verbose: bool,
}

fn parse_width(value: &str) -> Result<PointerWidth, String> {
    value
        .parse()
        .ok()
        .and_then(PointerWidth::from_bits)
        .ok_or_else(|| format!("unsupported pointer width '{value}'"))
}

/// Allocate a string array in `segment` holding `refs`.
fn alloc_array(
    heap: &mut HeapBuilder,
    segment: SegmentId,
    array_type: usize,
    refs: &[usize],
) -> Result<usize, MemoryError> {
    let word = heap.width().bytes();
    let size = 2 * word + word * refs.len();
    let array = heap.alloc_object(segment, array_type, size)?;
    heap.write_word(array + word, refs.len() as u64);
    for (i, &target) in refs.iter().enumerate() {
        heap.write_ref(array, 2 * word + word * i, target);
    }
    Ok(array)
}

fn build_heap(cli: &Cli) -> Result<HeapBuilder, MemoryError> {
    let mut heap = HeapBuilder::new(cli.width);
    let word = cli.width.bytes();
    let array_type = heap.define_type(
        "System.String[]",
        TypeFlags::CONTAINS_POINTERS,
        TypeLayout::Series(vec![Series {
            offset: 2 * word,
            size: 0,
        }]),
        2 * word,
    );

    let young = cli.young.then(|| heap.segment(0, false));
    let frozen = cli.frozen.then(|| heap.segment(2, true));
    let old = heap.segment(2, false);

    for i in 0..cli.distinct {
        let text = format!("value-{i}");
        let mut refs = (0..cli.copies)
            .map(|_| heap.alloc_string(old, &text))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(young) = young {
            refs.push(heap.alloc_string(young, &text)?);
        }
        alloc_array(&mut heap, old, array_type, &refs)?;
        if let Some(frozen) = frozen {
            alloc_array(&mut heap, frozen, array_type, &refs)?;
        }
    }
    Ok(heap)
}

/// The simulated heap plus the handle of its text type.
fn lay_out(
    cli: &Cli,
) -> Result<(usize, Arena, SimulatedRuntime), MemoryError> {
    let heap = build_heap(cli)?;
    let string_type = heap.string_type();
    let (arena, runtime) = heap.build()?;
    Ok((string_type, arena, runtime))
}

fn main() {
    let cli = Cli::parse();
    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(filter),
    )
    .init();

    let (string_type, arena, runtime) = match lay_out(&cli) {
        Ok(laid_out) => laid_out,
        Err(err) => {
            eprintln!("Error laying out heap: {}", err);
            process::exit(1);
        }
    };
    let generations = runtime.generation_count();

    let info = ProfilerCreateInfo {
        trigger: Some(match cli.trigger {
            Trigger::Collection => TriggerMode::CollectionStarted,
            Trigger::Suspend => TriggerMode::RuntimeSuspend,
        }),
        ..Default::default()
    };
    let profiler = match Profiler::new(arena, runtime, info) {
        Ok(profiler) => profiler,
        Err(err) => {
            eprintln!("Error creating profiler: {}", err);
            process::exit(1);
        }
    };

    if let Err(err) = profiler.type_load_finished(string_type, 0) {
        eprintln!("Error identifying text type: {}", err);
        process::exit(1);
    }

    for pass in 1..=cli.passes {
        let outcome = match cli.trigger {
            Trigger::Collection => profiler.collection_started(generations),
            Trigger::Suspend => {
                profiler.runtime_suspend_started(SuspendReason::Gc);
                profiler.runtime_suspend_finished()
            }
        };
        match outcome {
            Ok(Some(PassOutcome::Completed(stats))) => {
                println!("pass {pass}: {stats}")
            }
            Ok(Some(PassOutcome::Skipped(reason))) => {
                println!("pass {pass}: skipped ({reason:?})")
            }
            Ok(None) => println!("pass {pass}: not triggered"),
            Err(err) => {
                eprintln!("Error in pass {}: {}", pass, err);
                process::exit(1);
            }
        }
        profiler.collection_finished();
    }

    profiler.shutdown();
}
