mod animation;
mod animation_state;
mod curve;
mod event_queue;
mod skeleton;
mod slot_timeline;
mod timeline;

pub use animation::*;
pub use animation_state::*;
pub use curve::*;
pub use event_queue::{AnimationStateEvent, AnimationStateListener, ListenerId};
pub use skeleton::*;
pub use slot_timeline::*;
pub use timeline::*;

#[cfg(test)]
pub(crate) mod test_fixtures;


#[cfg(test)]
mod timeline_tests;



#[cfg(test)]
mod animation_state_tests;
