use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rs_ws281x::{Controller, RawColor};

use crate::ring::SharedRing;
use crate::UDP_MAX_PACKET_SIZE;

pub const BYTES_PER_LED: usize = 3;

const WORKER_POLL: Duration = Duration::from_millis(50);

/// Maps one channel's slice of a frame onto its LED array. The frame is a
/// run of 3-byte RGB groups starting at `offset`; LEDs past the end of the
/// payload keep their previous color.
pub fn frame_to_channel(raw: &[u8], offset: usize, leds: &mut [RawColor]) {
    for i in 0..leds.len() {
        let base = offset + BYTES_PER_LED * i;
        if base + BYTES_PER_LED <= raw.len() {
            leds[i] = [0xFF, raw[base], raw[base + 1], raw[base + 2]];
        }
    }
}

/// Walks the configured channels in order, applying the frame at the
/// running byte offset.
pub fn apply_frame(controller: &mut Controller, raw: &[u8]) {
    let mut offset = 0;
    for channel in controller.channels().iter() {
        let leds = controller.leds_mut(*channel);
        frame_to_channel(raw, offset, leds);
        offset += leds.len() * BYTES_PER_LED;
    }
}

pub fn set_all(leds: &mut [RawColor], r: u8, g: u8, b: u8) {
    for led in leds.iter_mut() {
        *led = [0xFF, r, g, b];
    }
}

pub fn blank(controller: &mut Controller) {
    for channel in controller.channels().iter() {
        set_all(controller.leds_mut(*channel), 0x00, 0x00, 0x00);
    }
    controller.render().expect("Failed to render");
}

/// Brief power-on chase across the channels so a miswired strip shows up
/// before any frame data arrives.
pub fn startup_test(controller: &mut Controller) {
    let channels = controller.channels();
    for round in 0..4 {
        let lit = channels[round % channels.len()];
        for channel in channels.iter() {
            if *channel == lit {
                set_all(controller.leds_mut(*channel), 0x55, 0x02, 0x01);
            } else {
                set_all(controller.leds_mut(*channel), 0x00, 0x00, 0x00);
            }
        }
        controller.render().expect("Failed to render");
        thread::sleep(Duration::from_millis(250));
    }
    blank(controller);
}

/// Dedicated render loop used when interrupts are allowed: packet intake
/// keeps draining the socket while this thread owns the driver. Blanks the
/// strips on the way out.
pub fn render_worker(ring: SharedRing, mut controller: Controller, running: Arc<AtomicBool>) {
    let mut frame = vec![0u8; UDP_MAX_PACKET_SIZE];
    while running.load(Ordering::SeqCst) {
        if let Some(len) = ring.wait_pop_into(&mut frame, WORKER_POLL) {
            apply_frame(&mut controller, &frame[..len]);
            controller.render().expect("Render failed...");
        }
    }
    blank(&mut controller);
}
