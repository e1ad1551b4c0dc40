use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use env_logger;
use log::info;

use winbuf::{
    Color, Config, DrawInfo, Drawing, HeadlessPlatform, Platform, Rect, WindowHandle,
    WindowManager,
};

const FRAMES: u32 = 60;

// One frame of the demo animation: a bar sweeping across a dark background.
fn draw_frame(drawing: &Drawing, handle: &WindowHandle, frame: u32) -> winbuf::Result<()> {
    let (width, height) = drawing.surface_size(handle).unwrap_or((1, 1));
    drawing.clear(handle, Color::rgb(0.1, 0.1, 0.12))?;
    let bar = (width / 8).max(1);
    let x = (frame * 4) % width;
    let shade = (frame % 30) as f32 / 30.0;
    drawing.draw(
        handle,
        &DrawInfo {
            rect: Rect::new(x as f32, 0.0, bar as f32, height as f32),
            color: Color::rgb(0.2 + 0.8 * shade, 0.5, 1.0 - shade),
        },
    )
}

fn main() -> Result<()> {
    env_logger::init();
    info!("starting winbuf demo (headless platform)");

    let platform = Arc::new(HeadlessPlatform::default());
    let shared: Arc<dyn Platform> = platform.clone();
    let manager = WindowManager::with_config(shared, Config::from_env());
    let drawing = Drawing::for_manager(&manager);

    let handle = WindowHandle::new("demo");
    drawing.attach(&manager, &handle);
    manager.register_move(&handle, |handle, native| info!("{handle} moved ({native})"));

    manager.open(&handle)?;
    let native = manager
        .native(&handle)
        .ok_or_else(|| anyhow!("{handle} did not start"))?;

    let producer = {
        let (drawing, manager, handle) = (Arc::clone(&drawing), manager.clone(), handle.clone());
        thread::spawn(move || -> winbuf::Result<()> {
            for frame in 0..FRAMES {
                drawing.begin_drawing(&handle);
                let drawn = draw_frame(&drawing, &handle, frame);
                drawing.end_drawing(&handle);
                drawn?;
                manager.repaint(&handle);
                thread::sleep(Duration::from_millis(16));
            }
            Ok(())
        })
    };

    thread::sleep(Duration::from_millis(300));
    platform.move_to(native, 40, 40);
    platform.resize(native, 320, 200);

    producer
        .join()
        .map_err(|_| anyhow!("producer thread panicked"))??;

    manager.close(&handle);
    while manager.exists(&handle) {
        thread::sleep(Duration::from_millis(10));
    }
    info!(
        "{handle} closed after {} blits",
        platform.frame_count(native)
    );
    Ok(())
}
