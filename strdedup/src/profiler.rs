//! Host notification handlers.
//!
//! [`Profiler`] is what a runtime integration holds on to. Every callback
//! the engine cares about maps to one method here; all of them that can
//! start a pass go through [`Profiler::request_pass`], so the two trigger
//! modes only differ in which notification calls it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use heapscan::{Memory, PointerWidth};
use parking_lot::Mutex;

use crate::{
    CollectionPass, DedupTable, Error, PassOutcome, PassStats,
    ProfilerCreateInfo, ProfilerSettings, Runtime, TextType, TextTypeCell,
    TriggerMode, is_text_type_name,
};

/// Why the runtime is suspending its threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendReason {
    Other,
    Gc,
    AppDomainShutdown,
    CodePitching,
    Shutdown,
    InprocDebugger,
    GcPrep,
    Rejit,
    Profiler,
}

impl SuspendReason {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Gc,
            2 => Self::AppDomainShutdown,
            3 => Self::CodePitching,
            4 => Self::Shutdown,
            6 => Self::InprocDebugger,
            7 => Self::GcPrep,
            8 => Self::Rejit,
            9 => Self::Profiler,
            _ => Self::Other,
        }
    }

    #[inline]
    pub fn is_for_gc(self) -> bool {
        matches!(self, Self::Gc | Self::GcPrep)
    }
}

pub struct Profiler<M: Memory, R: Runtime> {
    memory: M,
    runtime: R,
    settings: ProfilerSettings,
    text: TextTypeCell,
    table: Mutex<DedupTable>,
    suspend_for_gc: AtomicBool,
    last_pass: Mutex<Option<PassStats>>,
    passes: AtomicUsize,
}

impl<M: Memory, R: Runtime> Profiler<M, R> {
    pub fn new(
        memory: M,
        runtime: R,
        info: ProfilerCreateInfo,
    ) -> Result<Self, Error> {
        let settings = ProfilerSettings::from_info(info)?;
        Ok(Self {
            memory,
            runtime,
            settings,
            text: TextTypeCell::new(),
            table: Mutex::new(DedupTable::new()),
            suspend_for_gc: AtomicBool::new(false),
            last_pass: Mutex::new(None),
            passes: AtomicUsize::new(0),
        })
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn settings(&self) -> &ProfilerSettings {
        &self.settings
    }

    pub fn text_type(&self) -> Option<TextType> {
        self.text.get().copied()
    }

    /// Statistics of the most recent completed pass.
    pub fn last_pass(&self) -> Option<PassStats> {
        *self.last_pass.lock()
    }

    pub fn passes_completed(&self) -> usize {
        self.passes.load(Ordering::Relaxed)
    }

    /// Candidates currently held; zero outside of a pass.
    pub fn pending_candidates(&self) -> usize {
        self.table.lock().len()
    }

    /// Attach-time configuration. The payload is the text type handle as
    /// one native-endian pointer word; anything else is ignored.
    pub fn initialize_for_attach(
        &self,
        client_data: &[u8],
    ) -> Result<(), Error> {
        let handle = match (self.memory.width(), client_data) {
            (PointerWidth::Bits32, &[a, b, c, d]) => {
                u32::from_ne_bytes([a, b, c, d]) as usize
            }
            (PointerWidth::Bits64, bytes) if bytes.len() == 8 => {
                let mut word = [0; 8];
                word.copy_from_slice(bytes);
                u64::from_ne_bytes(word) as usize
            }
            _ => {
                log::warn!(
                    "ignoring attach payload of {} bytes, expected {}",
                    client_data.len(),
                    self.memory.width().bytes()
                );
                return Ok(());
            }
        };
        if handle == 0 {
            log::warn!("ignoring null text type handle in attach payload");
            return Ok(());
        }

        let layout = self.runtime.string_layout()?;
        self.record_text_type(TextType { handle, layout });
        Ok(())
    }

    /// A type finished loading. Identifies the text type by name.
    pub fn type_load_finished(
        &self,
        type_handle: usize,
        status: i32,
    ) -> Result<(), Error> {
        if status != 0 || self.text.get().is_some() {
            return Ok(());
        }

        let info = self.runtime.class_info(type_handle)?;
        let name = self.runtime.type_name(info.module, info.token)?;
        if !is_text_type_name(&name, &self.settings.text_type_name) {
            return Ok(());
        }

        let layout = self.runtime.string_layout()?;
        self.record_text_type(TextType {
            handle: type_handle,
            layout,
        });
        Ok(())
    }

    fn record_text_type(&self, text: TextType) {
        if self.text.set(text) {
            log::info!(
                "text type at {:#x}, length at +{}, characters at +{}",
                text.handle,
                text.layout.length_offset,
                text.layout.buffer_offset
            );
        }
    }

    /// A collection is starting; the runtime is already suspended.
    pub fn collection_started(
        &self,
        generation_count: usize,
    ) -> Result<Option<PassOutcome>, Error> {
        match self.settings.trigger {
            TriggerMode::CollectionStarted => {
                self.request_pass(Some(generation_count)).map(Some)
            }
            TriggerMode::RuntimeSuspend => Ok(None),
        }
    }

    pub fn collection_finished(&self) {
        log::trace!("collection finished");
    }

    pub fn runtime_suspend_started(&self, reason: SuspendReason) {
        if self.settings.trigger == TriggerMode::RuntimeSuspend
            && reason.is_for_gc()
        {
            self.suspend_for_gc.store(true, Ordering::Release);
        }
    }

    /// Every thread is suspended. Runs the pass if the suspend was for a
    /// collection.
    pub fn runtime_suspend_finished(
        &self,
    ) -> Result<Option<PassOutcome>, Error> {
        if !self.suspend_for_gc.swap(false, Ordering::AcqRel) {
            return Ok(None);
        }
        self.request_pass(None).map(Some)
    }

    pub fn runtime_suspend_aborted(&self) {
        self.suspend_for_gc.store(false, Ordering::Release);
    }

    pub fn shutdown(&self) {
        self.table.lock().clear();
        self.suspend_for_gc.store(false, Ordering::Release);
        log::debug!("shut down after {} passes", self.passes_completed());
    }

    /// Run one pass now.
    pub fn request_pass(
        &self,
        generation_count: Option<usize>,
    ) -> Result<PassOutcome, Error> {
        let mut table = self.table.lock();
        let outcome = CollectionPass::new(
            &self.memory,
            &self.runtime,
            &self.settings,
            self.text_type(),
            &mut *table,
        )
        .run(generation_count)
        .inspect_err(|err| log::warn!("pass aborted: {err}"))?;

        match &outcome {
            PassOutcome::Completed(stats) => {
                let pass = self.passes.fetch_add(1, Ordering::Relaxed) + 1;
                log::debug!("pass {pass}: {stats}");
                *self.last_pass.lock() = Some(*stats);
            }
            PassOutcome::Skipped(reason) => {
                log::debug!("pass skipped: {reason:?}");
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{HeapBuilder, Series, SimulatedRuntime, TypeLayout};
    use crate::{HostError, TypeFlags};
    use heapscan::Arena;

    struct Scene {
        profiler: Profiler<Arena, SimulatedRuntime>,
        string_type: usize,
        holder: usize,
        strings: [usize; 2],
    }

    fn scene(width: PointerWidth, trigger: TriggerMode) -> Scene {
        let mut heap = HeapBuilder::new(width);
        let word = width.bytes();
        let pair = heap.define_type(
            "Pair",
            TypeFlags::CONTAINS_POINTERS,
            TypeLayout::Series(vec![Series {
                offset: word,
                size: 2 * word,
            }]),
            3 * word,
        );
        heap.segment(0, false);
        let old = heap.segment(2, false);
        let a = heap.alloc_string(old, "abc").unwrap();
        let b = heap.alloc_string(old, "abc").unwrap();
        let holder = heap.alloc_object(old, pair, 3 * word).unwrap();
        heap.write_ref(holder, word, a);
        heap.write_ref(holder, 2 * word, b);
        let string_type = heap.string_type();
        let (arena, runtime) = heap.build().unwrap();

        let info = ProfilerCreateInfo {
            trigger: Some(trigger),
            ..Default::default()
        };
        Scene {
            profiler: Profiler::new(arena, runtime, info).unwrap(),
            string_type,
            holder,
            strings: [a, b],
        }
    }

    impl Scene {
        fn slots(&self) -> [usize; 2] {
            let word = self.profiler.memory().width().bytes();
            let memory = self.profiler.memory();
            let read = |at| memory.read_word(at).unwrap() as usize;
            [read(self.holder + word), read(self.holder + 2 * word)]
        }
    }

    #[test]
    fn suspend_reasons_from_host_codes() {
        assert!(SuspendReason::from_code(1).is_for_gc());
        assert!(SuspendReason::from_code(7).is_for_gc());
        assert_eq!(SuspendReason::from_code(4), SuspendReason::Shutdown);
        assert_eq!(SuspendReason::from_code(42), SuspendReason::Other);
        assert!(!SuspendReason::from_code(0).is_for_gc());
    }

    #[test]
    fn text_type_identified_on_load() {
        let s = scene(PointerWidth::Bits64, TriggerMode::CollectionStarted);
        let outcome = s.profiler.collection_started(3).unwrap();
        assert_eq!(
            outcome,
            Some(PassOutcome::Skipped(crate::SkipReason::TextTypeUnknown))
        );

        // failed loads are ignored
        s.profiler.type_load_finished(s.string_type, -1).unwrap();
        assert!(s.profiler.text_type().is_none());

        s.profiler.type_load_finished(s.string_type, 0).unwrap();
        let text = s.profiler.text_type().unwrap();
        assert_eq!(text.handle, s.string_type);
        assert_eq!(text.layout.buffer_offset, 12);

        let Some(PassOutcome::Completed(stats)) =
            s.profiler.collection_started(3).unwrap()
        else {
            panic!("pass should run once the text type is known");
        };
        assert_eq!(stats.dedup.rewrites, 1);
        assert_eq!(s.slots(), [s.strings[0]; 2]);
        assert_eq!(s.profiler.passes_completed(), 1);
        assert_eq!(s.profiler.last_pass(), Some(stats));
        assert_eq!(s.profiler.pending_candidates(), 0);
    }

    #[test]
    fn other_types_do_not_become_the_text_type() {
        let mut heap = HeapBuilder::new(PointerWidth::Bits64);
        let other = heap.define_type(
            "System.StringComparer",
            TypeFlags::empty(),
            TypeLayout::Opaque,
            8,
        );
        let (arena, runtime) = heap.build().unwrap();
        let info = ProfilerCreateInfo::default();
        let profiler = Profiler::new(arena, runtime, info).unwrap();
        profiler.type_load_finished(other, 0).unwrap();
        assert!(profiler.text_type().is_none());
    }

    #[test]
    fn attach_payload_names_the_text_type() {
        for width in [PointerWidth::Bits32, PointerWidth::Bits64] {
            let s = scene(width, TriggerMode::CollectionStarted);
            let payload = match width {
                PointerWidth::Bits32 => {
                    (s.string_type as u32).to_ne_bytes().to_vec()
                }
                PointerWidth::Bits64 => {
                    (s.string_type as u64).to_ne_bytes().to_vec()
                }
            };

            s.profiler.initialize_for_attach(&payload).unwrap();
            let handle = s.profiler.text_type().map(|t| t.handle);
            assert_eq!(handle, Some(s.string_type), "{width}");
        }
    }

    #[test]
    fn attach_payload_of_wrong_size_is_ignored() {
        let s = scene(PointerWidth::Bits64, TriggerMode::CollectionStarted);
        s.profiler.initialize_for_attach(&[1, 2, 3, 4]).unwrap();
        s.profiler.initialize_for_attach(&[]).unwrap();
        s.profiler.initialize_for_attach(&[0; 8]).unwrap();
        assert!(s.profiler.text_type().is_none());
    }

    #[test]
    fn attach_reports_host_failure() {
        let s = scene(PointerWidth::Bits64, TriggerMode::CollectionStarted);
        s.profiler.runtime().fail("string_layout");
        let payload = (s.string_type as u64).to_ne_bytes();
        assert_eq!(
            s.profiler.initialize_for_attach(&payload),
            Err(Error::Host(HostError::fail("string_layout")))
        );
        assert!(s.profiler.text_type().is_none());
    }

    #[test]
    fn suspend_trigger_runs_on_gc_suspend_only() {
        let s = scene(PointerWidth::Bits64, TriggerMode::RuntimeSuspend);
        s.profiler.type_load_finished(s.string_type, 0).unwrap();

        // collection notifications do not trigger in this mode
        assert_eq!(s.profiler.collection_started(3).unwrap(), None);

        s.profiler.runtime_suspend_started(SuspendReason::Shutdown);
        assert_eq!(s.profiler.runtime_suspend_finished().unwrap(), None);

        s.profiler.runtime_suspend_started(SuspendReason::Gc);
        s.profiler.runtime_suspend_aborted();
        assert_eq!(s.profiler.runtime_suspend_finished().unwrap(), None);
        assert_eq!(s.slots(), s.strings);

        s.profiler.runtime_suspend_started(SuspendReason::from_code(1));
        let outcome = s.profiler.runtime_suspend_finished().unwrap();
        assert!(matches!(outcome, Some(PassOutcome::Completed(_))));
        assert_eq!(s.slots(), [s.strings[0]; 2]);

        // consumed
        assert_eq!(s.profiler.runtime_suspend_finished().unwrap(), None);
    }

    #[test]
    fn collection_trigger_ignores_suspends() {
        let s = scene(PointerWidth::Bits64, TriggerMode::CollectionStarted);
        s.profiler.type_load_finished(s.string_type, 0).unwrap();
        s.profiler.runtime_suspend_started(SuspendReason::Gc);
        assert_eq!(s.profiler.runtime_suspend_finished().unwrap(), None);
        assert_eq!(s.profiler.passes_completed(), 0);
    }

    #[test]
    fn failed_pass_leaves_profiler_usable() {
        let s = scene(PointerWidth::Bits64, TriggerMode::CollectionStarted);
        s.profiler.type_load_finished(s.string_type, 0).unwrap();
        s.profiler.runtime().fail("object_generation");
        assert!(s.profiler.collection_started(3).is_err());
        assert_eq!(s.profiler.pending_candidates(), 0);
        assert_eq!(s.profiler.last_pass(), None);

        s.profiler.runtime().recover("object_generation");
        assert!(matches!(
            s.profiler.collection_started(3).unwrap(),
            Some(PassOutcome::Completed(_))
        ));
        s.profiler.collection_finished();
        s.profiler.shutdown();
        assert_eq!(s.profiler.passes_completed(), 1);
    }
}
