//! Concurrency properties of rings and fan-out buffers

use chanpipe::{FanoutBuffer, Sample, SampleRing, WorkError};
use std::sync::Arc;
use std::thread;

#[test]
fn ring_reads_are_never_short_while_open() {
    const READ: usize = 88;
    const WRITES: usize = 1000;

    let ring = Arc::new(SampleRing::new(READ * 2));
    let writer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            // Odd-sized writes so reads keep straddling write boundaries
            for k in 0..WRITES {
                let chunk = vec![Sample::new(k as f32, 0.0); 1 + k % 37];
                ring.write(&chunk).unwrap();
            }
            ring.signal_shutdown();
        })
    };

    let total: usize = (0..WRITES).map(|k| 1 + k % 37).sum();
    let mut read = 0;
    let mut last = f32::MIN;
    loop {
        match ring.read(READ) {
            Ok(mut chunk) => {
                assert_eq!(chunk.len(), READ);
                // FIFO order across chunks
                for sample in chunk.samples() {
                    assert!(sample.re >= last);
                    last = sample.re;
                }
                read += chunk.len();
                chunk.release();
            }
            Err(WorkError::EndOfStream) => break,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    writer.join().unwrap();

    assert_eq!(read, total / READ * READ);
    assert_eq!(ring.len(), total % READ);
}

#[test]
fn ring_write_after_shutdown_fails() {
    let ring = SampleRing::new(4);
    ring.signal_shutdown();
    ring.signal_shutdown();
    assert_eq!(ring.write(&[Sample::new(1.0, 0.0)]), Err(WorkError::RingShutdown));
}

fn assert_no_tearing(consumers: usize, cycles: usize) {
    const FRAME: usize = 64;
    let (buffer, readers) = FanoutBuffer::new(FRAME, consumers);

    let handles: Vec<_> = readers
        .into_iter()
        .map(|reader| {
            thread::spawn(move || {
                let mut seen = Vec::with_capacity(cycles);
                loop {
                    match reader.consume(|frame| {
                        // Every sample of a frame carries the same tag
                        let tag = frame[0].re;
                        assert!(frame.iter().all(|s| s.re == tag && s.im == -tag));
                        tag as usize
                    }) {
                        Ok(tag) => seen.push(tag),
                        Err(WorkError::EndOfStream) => break,
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
                // Stays ended
                assert_eq!(reader.consume(|_| ()), Err(WorkError::EndOfStream));
                seen
            })
        })
        .collect();

    buffer.await_consumers();
    for k in 0..cycles {
        let mut writer = buffer.begin_frame();
        for (i, sample) in writer.frame_mut().iter_mut().enumerate() {
            // Write in two passes so a torn read would see mixed tags
            if i % 2 == 0 {
                *sample = Sample::new(k as f32, -(k as f32));
            }
        }
        for (i, sample) in writer.frame_mut().iter_mut().enumerate() {
            if i % 2 == 1 {
                *sample = Sample::new(k as f32, -(k as f32));
            }
        }
        writer.release();
    }
    buffer.close();

    let expected: Vec<usize> = (0..cycles).collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

#[test]
fn fanout_single_consumer_no_tearing() {
    assert_no_tearing(1, 1000);
}

#[test]
fn fanout_two_consumers_no_tearing() {
    assert_no_tearing(2, 1000);
}

#[test]
fn fanout_five_consumers_no_tearing() {
    assert_no_tearing(5, 1000);
}
