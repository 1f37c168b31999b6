//! Main-thread event loop.
//!
//! Global hotkeys are only delivered while the thread that registered them
//! dispatches OS messages (Windows) or runs the application run loop
//! (macOS). [`MainLoop`] is that loop. It owns no window; everything it
//! handles arrives as a user event posted through a [`LoopProxy`].

use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::debug;
use winit::event::Event;
use winit::event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy};

/// Errors from the main-thread event loop.
#[derive(Debug, Error)]
pub enum LoopError {
    /// The platform event loop could not be created, usually because no
    /// desktop session is available or this is not the main thread.
    #[error("event loop unavailable: {0}")]
    Unavailable(String),

    /// The event loop exited with an error.
    #[error("event loop failed: {0}")]
    Failed(String),
}

/// A windowless event loop carrying messages of type `T`.
///
/// Must be created and run on the main thread.
pub struct MainLoop<T: 'static> {
    event_loop: EventLoop<T>,
}

impl<T: 'static> std::fmt::Debug for MainLoop<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainLoop").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> MainLoop<T> {
    /// Build the loop on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses to create an event loop.
    pub fn new() -> Result<Self, LoopError> {
        let mut builder = EventLoopBuilder::<T>::with_user_event();
        #[cfg(target_os = "macos")]
        {
            use winit::platform::macos::{ActivationPolicy, EventLoopBuilderExtMacOS};
            // No dock icon for a background helper.
            builder.with_activation_policy(ActivationPolicy::Accessory);
        }
        let event_loop = builder
            .build()
            .map_err(|e| LoopError::Unavailable(e.to_string()))?;
        Ok(Self { event_loop })
    }

    /// Handle for posting messages from other threads.
    #[must_use]
    pub fn proxy(&self) -> LoopProxy<T> {
        LoopProxy {
            proxy: Mutex::new(self.event_loop.create_proxy()),
        }
    }

    /// Run until `on_message` returns `false`, dispatching OS events in
    /// between.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform loop fails.
    pub fn run<F>(self, mut on_message: F) -> Result<(), LoopError>
    where
        F: FnMut(T) -> bool + 'static,
    {
        debug!("Main event loop started");
        self.event_loop
            .run(move |event, target| match event {
                Event::UserEvent(message) => {
                    if !on_message(message) {
                        target.exit();
                    }
                }
                Event::AboutToWait => target.set_control_flow(ControlFlow::Wait),
                _ => {}
            })
            .map_err(|e| LoopError::Failed(e.to_string()))?;
        debug!("Main event loop stopped");
        Ok(())
    }
}

/// Posts messages into a [`MainLoop`] from any thread.
pub struct LoopProxy<T: 'static> {
    proxy: Mutex<EventLoopProxy<T>>,
}

impl<T: 'static> LoopProxy<T> {
    /// Post `message`; `false` once the loop has exited.
    pub fn send(&self, message: T) -> bool {
        self.proxy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send_event(message)
            .is_ok()
    }
}

impl<T: 'static> Clone for LoopProxy<T> {
    fn clone(&self) -> Self {
        let proxy = self
            .proxy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Self {
            proxy: Mutex::new(proxy),
        }
    }
}

impl<T: 'static> std::fmt::Debug for LoopProxy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopProxy").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_error_display() {
        let err = LoopError::Unavailable("no display".to_string());
        assert_eq!(err.to_string(), "event loop unavailable: no display");
    }

    #[test]
    #[ignore = "requires a desktop session and the main thread"]
    fn test_main_loop_stops_on_false() {
        let main_loop = MainLoop::<u32>::new().unwrap();
        let proxy = main_loop.proxy();
        assert!(proxy.send(1));
        assert!(proxy.send(2));

        // Returns once the second message asks it to stop.
        main_loop.run(|n| n != 2).unwrap();
    }
}
