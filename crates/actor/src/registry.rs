use std::collections::HashMap;

use parking_lot::RwLock;

use crate::cell::{ActorId, AnyActorRef};
use crate::error::ActorError;

/// Name → actor map shared by every actor of one system.
///
/// Bindings are removed when their actor dies, so lookups only ever see live
/// actors (a dead entry still in the map is filtered out).
#[derive(Default)]
pub(crate) struct Registry {
	names: RwLock<HashMap<String, AnyActorRef>>,
}

impl Registry {
	/// Binds `name` to `actor`. Rebinding a name held by a dead actor is allowed.
	pub(crate) fn bind(&self, name: &str, actor: &AnyActorRef) -> Result<(), ActorError> {
		let mut names = self.names.write();
		if let Some(holder) = names.get(name)
			&& holder.id() != actor.id()
			&& holder.is_alive()
		{
			return Err(ActorError::NameTaken {
				name: name.to_string(),
				holder: holder.id(),
			});
		}
		names.insert(name.to_string(), actor.clone());
		Ok(())
	}

	/// Removes `name` if it is still bound to `actor`.
	pub(crate) fn unbind(&self, name: &str, actor: ActorId) {
		let mut names = self.names.write();
		if names.get(name).is_some_and(|holder| holder.id() == actor) {
			names.remove(name);
		}
	}

	pub(crate) fn whereis(&self, name: &str) -> Option<AnyActorRef> {
		self.names.read().get(name).filter(|actor| actor.is_alive()).cloned()
	}

	/// Registered names of live actors, sorted.
	pub(crate) fn names(&self) -> Vec<String> {
		let mut names: Vec<_> = self.names.read().iter().filter(|(_, actor)| actor.is_alive()).map(|(name, _)| name.clone()).collect();
		names.sort();
		names
	}
}
