//! End-to-end test of the process-wide embedder surface and the
//! introspection module over the default backend.
//!
//! Everything lives in one test: the surface drives a process singleton,
//! and the harness runs separate tests in parallel.

mod support;

use onyx_core::JitError;
use onyx_jit::{introspect, CompileResult, JitOptions, TypeSlots};
use support::make_func;

#[test]
fn test_embedder_surface_end_to_end() {
    // Before initialization everything is off.
    assert!(!onyx_jit::is_enabled());
    let early = make_func("m", "early");
    assert_eq!(
        onyx_jit::compile_function(&early),
        CompileResult::NotInitialized
    );
    assert_eq!(introspect::get_compilation_time(), 0);
    assert!(introspect::get_supported_opcodes().is_empty());

    // Bring the JIT up with the default backend.
    onyx_jit::initialize(&JitOptions::new().with_flag("jit")).unwrap();
    assert!(onyx_jit::is_enabled());
    assert!(onyx_jit::are_type_slots_enabled());
    assert_eq!(introspect::jit_frame_mode(), 0);
    assert_eq!(introspect::get_jit_list(), None);

    // Register and compile.
    let func = make_func("m", "f");
    assert!(onyx_jit::register_function(&func));
    assert!(!introspect::is_jit_compiled(&func));
    assert!(introspect::force_compile(&func));
    assert!(introspect::is_jit_compiled(&func));
    assert!(onyx_jit::is_compiled(&func));
    assert!(func.has_native_entry());

    // Introspection over the compiled function.
    assert!(introspect::get_compiled_size(&func) > 0);
    assert!(introspect::get_compiled_stack_size(&func) > 0);
    assert!(introspect::get_compiled_spill_stack_size(&func) > 0);
    assert!(introspect::print_hir(&func).unwrap().contains("fn m:f"));
    assert!(introspect::disassemble(&func).unwrap().contains("int3"));
    assert!(introspect::get_function_compilation_time(&func).is_some());
    assert!(!introspect::get_supported_opcodes().is_empty());
    let compiled = introspect::get_compiled_functions();
    assert!(compiled.iter().any(|f| f.qualname() == "f"));

    // Uncompiled functions error out of the artifact queries.
    let other = make_func("m", "other");
    assert_eq!(introspect::print_hir(&other), Err(JitError::NotCompiled));
    assert_eq!(introspect::disassemble(&other), Err(JitError::NotCompiled));

    // force_compile of an unregistered function declines.
    assert!(!introspect::force_compile(&other));
    assert!(!introspect::is_jit_compiled(&other));

    // The frame decorator flips the code flag and hands the function back.
    let decorated = introspect::jit_force_normal_frame(&other);
    assert!(decorated.code().is_normal_frame_required());

    // Type specialization through the surface.
    let ty = onyx_runtime::TypeObject::new("list");
    let mut slots = TypeSlots::default();
    assert_eq!(onyx_jit::specialize_type(&ty, &mut slots), CompileResult::Ok);
    assert!(slots.call.is_some());

    // Enable/disable toggling.
    onyx_jit::disable();
    assert!(!onyx_jit::is_enabled());
    assert!(!onyx_jit::are_type_slots_enabled());
    assert!(!onyx_jit::register_function(&other));
    onyx_jit::enable();
    assert!(onyx_jit::is_enabled());
    assert!(onyx_jit::enable_type_slots());

    // Test-multithreaded mode is off in this configuration.
    assert!(!introspect::is_test_multithreaded_compile_enabled());
    assert!(introspect::test_multithreaded_compile().is_err());

    // Fork bookkeeping is callable any time.
    onyx_jit::after_fork_child();

    // Compilation time is visible and monotonic.
    let before = introspect::get_compilation_time();
    let g = make_func("m", "g");
    onyx_jit::register_function(&g);
    introspect::disable(true);
    assert!(introspect::is_jit_compiled(&g));
    assert!(introspect::get_compilation_time() >= before);

    // Finalize: every query degrades to zero/empty/nil.
    onyx_jit::finalize().unwrap();
    assert!(!onyx_jit::is_enabled());
    assert!(!introspect::is_jit_compiled(&func));
    assert_eq!(introspect::get_compilation_time(), 0);
    assert_eq!(introspect::get_function_compilation_time(&func), None);
    assert_eq!(introspect::get_compiled_size(&func), 0);
    assert!(introspect::get_compiled_functions().is_empty());
    assert!(introspect::get_supported_opcodes().is_empty());
    assert_eq!(introspect::get_jit_list(), None);
    assert_eq!(introspect::jit_frame_mode(), 0);
    assert_eq!(
        onyx_jit::compile_function(&func),
        CompileResult::NotInitialized
    );
}
