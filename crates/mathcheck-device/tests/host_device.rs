//! Host device driven through the public traits

use mathcheck_core::{lookup, Precision};
use mathcheck_device::{
    build_options, kernel_source, CommandQueue, Device, DeviceError, Fault, HostDevice, KernelSpec, ProgramCache,
    ProgramKey, VECTOR_WIDTHS,
};
use rayon::prelude::*;

fn build(device: &HostDevice, name: &str, precision: Precision, width: u32, options: &str) -> mathcheck_device::ProgramHandle {
    let source = kernel_source::generate(KernelSpec::new(lookup(name).unwrap(), precision, width));
    device.build_program(&source, options).unwrap()
}

fn read_f32(queue: &mut impl CommandQueue, handle: mathcheck_device::BufferHandle, n: usize) -> Vec<f32> {
    let mut bytes = vec![0u8; n * 4];
    queue.read_buffer(handle, &mut bytes, true).unwrap();
    bytes.chunks_exact(4).map(bytemuck::pod_read_unaligned).collect()
}

#[test]
fn every_width_produces_the_same_results() {
    let device = HostDevice::new();
    let inputs: Vec<f32> = (0..64).map(|i| i as f32 * 0.25 - 4.0).collect();
    let mut expected = None;

    for width in VECTOR_WIDTHS {
        let program = build(&device, "atan2", Precision::Float, width, "");
        let mut queue = device.create_queue().unwrap();
        let out = queue.allocate_buffer(256).unwrap();
        let x = queue.allocate_buffer(256).unwrap();
        let y = queue.allocate_buffer(256).unwrap();
        queue.write_buffer(x, bytemuck::cast_slice(&inputs)).unwrap();
        queue.write_buffer(y, bytemuck::cast_slice(&inputs)).unwrap();
        let global = 64usize.div_ceil(width as usize);
        queue.launch(program, &[out, x, y], global).unwrap();
        let results = read_f32(&mut queue, out, 64);

        let bits: Vec<u32> = results.iter().map(|v| v.to_bits()).collect();
        match &expected {
            None => expected = Some(bits),
            Some(reference) => assert_eq!(&bits, reference, "width {width}"),
        }
    }
}

#[test]
fn denorms_are_zero_option_flushes() {
    let device = HostDevice::new();
    let program = build(&device, "assignment", Precision::Float, 1, &build_options(true, false, false));
    let mut queue = device.create_queue().unwrap();
    let out = queue.allocate_buffer(4).unwrap();
    let input = queue.allocate_buffer(4).unwrap();
    queue.write_buffer(input, &1u32.to_ne_bytes()).unwrap();
    queue.launch(program, &[out, input], 1).unwrap();
    assert_eq!(read_f32(&mut queue, out, 1)[0].to_bits(), 0);
}

#[test]
fn device_without_denormals_flushes() {
    let device = HostDevice::new().without_denormals();
    assert!(!device.info().denormals);
    let program = build(&device, "assignment", Precision::Float, 1, "");
    let mut queue = device.create_queue().unwrap();
    let out = queue.allocate_buffer(4).unwrap();
    let input = queue.allocate_buffer(4).unwrap();
    queue.write_buffer(input, &0x8000_0001u32.to_ne_bytes()).unwrap();
    queue.launch(program, &[out, input], 1).unwrap();
    assert_eq!(read_f32(&mut queue, out, 1)[0].to_bits(), 0x8000_0000);
}

#[test]
fn unsupported_precision_fails_to_build() {
    let device = HostDevice::new().without_fp64();
    let source = kernel_source::generate(KernelSpec::new(lookup("exp").unwrap(), Precision::Double, 1));
    assert!(matches!(device.build_program(&source, ""), Err(DeviceError::BuildFailed { .. })));
}

#[test]
fn injected_build_failure_reports_kernel() {
    let device = HostDevice::new().with_build_failure("cos");
    let source = kernel_source::generate(KernelSpec::new(lookup("cos").unwrap(), Precision::Float, 8));
    match device.build_program(&source, "") {
        Err(DeviceError::BuildFailed { kernel, .. }) => assert_eq!(kernel, "math_kernel8"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn fault_only_hits_its_builtin() {
    let device = HostDevice::new().with_fault(Fault::new("sin", 0, 2));
    let sin = build(&device, "sin", Precision::Float, 1, "");
    let cos = build(&device, "cos", Precision::Float, 1, "");
    let mut queue = device.create_queue().unwrap();
    let out = queue.allocate_buffer(4).unwrap();
    let input = queue.allocate_buffer(4).unwrap();
    queue.write_buffer(input, &0.5f32.to_ne_bytes()).unwrap();

    queue.launch(sin, &[out, input], 1).unwrap();
    let exact = mathcheck_core::reference::sin(0.5) as f32;
    assert_eq!(read_f32(&mut queue, out, 1)[0].to_bits(), exact.to_bits() + 2);

    queue.launch(cos, &[out, input], 1).unwrap();
    let exact = mathcheck_core::reference::cos(0.5) as f32;
    assert_eq!(read_f32(&mut queue, out, 1)[0], exact);
}

#[test]
fn stale_handles_are_rejected() {
    let device = HostDevice::new();
    let program = build(&device, "sin", Precision::Float, 1, "");
    device.release_program(program).unwrap();
    assert_eq!(device.live_programs(), 0);

    let mut queue = device.create_queue().unwrap();
    let out = queue.allocate_buffer(4).unwrap();
    let input = queue.allocate_buffer(4).unwrap();
    assert!(matches!(
        queue.launch(program, &[out, input], 1),
        Err(DeviceError::InvalidProgramHandle(_))
    ));

    queue.free_buffer(input).unwrap();
    let program = build(&device, "sin", Precision::Float, 1, "");
    assert!(matches!(
        queue.launch(program, &[out, input], 1),
        Err(DeviceError::InvalidBufferHandle(_))
    ));
    // The output survives the failed launch.
    assert_eq!(queue.live_buffers(), 1);
}

#[test]
fn read_statistics_distinguish_blocking() {
    let device = HostDevice::new();
    let mut queue = device.create_queue().unwrap();
    let buffer = queue.allocate_buffer(8).unwrap();
    let mut dst = [0u8; 8];
    queue.read_buffer(buffer, &mut dst, false).unwrap();
    queue.read_buffer(buffer, &mut dst, true).unwrap();
    queue.finish().unwrap();

    let stats = device.stats();
    assert_eq!(stats.queues, 1);
    assert_eq!(stats.non_blocking_reads, 1);
    assert_eq!(stats.blocking_reads, 1);
    assert_eq!(stats.finishes, 1);
}

#[test]
fn shared_cache_builds_once_across_threads() {
    let device = HostDevice::new();
    let cache = ProgramCache::new();
    let function = lookup("exp2").unwrap();

    let handles: Vec<_> = (0..16)
        .into_par_iter()
        .map(|_| {
            let key = ProgramKey::new(function.name, Precision::Float, 4, "");
            cache
                .get_or_try_create(
                    &key,
                    || {
                        let source = kernel_source::generate(KernelSpec::new(function, Precision::Float, 4));
                        let handle = device.build_program(&source, "")?;
                        Ok(mathcheck_device::BuiltProgram {
                            handle,
                            kernel_name: source.kernel_name,
                        })
                    },
                    |handle| device.release_program(handle),
                )
                .unwrap()
                .handle
        })
        .collect();

    assert!(handles.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(device.live_programs(), 1);
    cache.release_all(&device).unwrap();
    assert_eq!(device.live_programs(), 0);
}
