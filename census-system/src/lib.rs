//! Foundational service components for Census.
//!
//! Services in Census are small actors: they own their state exclusively, receive messages from
//! an inbox and handle them one by one on their own task. Other components talk to a service
//! through its [`Addr`], which can be cloned freely and used from any thread.
//!
//! A service defines its [`Interface`], which is usually an enum with one variant per message
//! type. Each message type is connected to the interface through [`FromMessage`], which also
//! declares how the service responds:
//!
//! - [`NoResponse`]: fire-and-forget. [`Addr::send`] returns immediately.
//! - [`AsyncResponse`]: the caller receives a [`Request`] future that resolves once the service
//!   has handled the message and replied through the [`Sender`].
//!
//! # Example
//!
//! ```
//! use census_system::{
//!     AsyncResponse, FromMessage, Interface, NoResponse, Receiver, Sender, Service,
//! };
//!
//! struct Increment;
//! struct GetCount;
//!
//! enum Counter {
//!     Increment(Increment),
//!     GetCount(GetCount, Sender<u64>),
//! }
//!
//! impl Interface for Counter {}
//!
//! impl FromMessage<Increment> for Counter {
//!     type Response = NoResponse;
//!     fn from_message(message: Increment, _: ()) -> Self {
//!         Self::Increment(message)
//!     }
//! }
//!
//! impl FromMessage<GetCount> for Counter {
//!     type Response = AsyncResponse<u64>;
//!     fn from_message(message: GetCount, sender: Sender<u64>) -> Self {
//!         Self::GetCount(message, sender)
//!     }
//! }
//!
//! struct CounterService(u64);
//!
//! impl Service for CounterService {
//!     type Interface = Counter;
//!
//!     fn spawn_handler(mut self, mut rx: Receiver<Self::Interface>) {
//!         tokio::spawn(async move {
//!             while let Some(message) = rx.recv().await {
//!                 match message {
//!                     Counter::Increment(_) => self.0 += 1,
//!                     Counter::GetCount(_, sender) => sender.send(self.0),
//!                 }
//!             }
//!         });
//!     }
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let addr = CounterService(0).start();
//! addr.send(Increment);
//! assert_eq!(addr.send(GetCount).await.unwrap(), 1);
//! # });
//! ```

#![warn(missing_docs)]

mod service;

pub use self::service::*;
