//! Interface database session lock
//!
//! A single system-wide token. It is taken and released by explicit
//! commands; nothing acquires it implicitly. Handlers that read and then
//! conditionally write interface state require the caller to hold it.

use super::events::ClientId;
use crate::protocol::Status;

#[derive(Debug, Default)]
pub struct SessionLock {
    holder: Option<ClientId>,
}

impl SessionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock. Fails while it is held, including by `client` itself.
    pub fn lock(&mut self, client: ClientId) -> Result<(), Status> {
        if self.holder.is_some() {
            return Err(Status::AlreadyLocked);
        }
        self.holder = Some(client);
        Ok(())
    }

    /// Release the lock held by `client`
    pub fn unlock(&mut self, client: ClientId) -> Result<(), Status> {
        match self.holder {
            None => Err(Status::NotLocked),
            Some(holder) if holder != client => Err(Status::WrongSession),
            Some(_) => {
                self.holder = None;
                Ok(())
            }
        }
    }

    pub fn holder(&self) -> Option<ClientId> {
        self.holder
    }

    pub fn is_held_by(&self, client: ClientId) -> bool {
        self.holder == Some(client)
    }

    /// Drop the lock if `client` holds it. Returns true if it was released.
    pub fn release_for(&mut self, client: ClientId) -> bool {
        if self.is_held_by(client) {
            self.holder = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(port: u16) -> ClientId {
        ClientId(([127, 0, 0, 1], port).into())
    }

    #[test]
    fn test_lock_twice_fails() {
        let mut lock = SessionLock::new();
        assert_eq!(lock.lock(client(1)), Ok(()));
        assert_eq!(lock.lock(client(1)), Err(Status::AlreadyLocked));
        assert_eq!(lock.lock(client(2)), Err(Status::AlreadyLocked));
    }

    #[test]
    fn test_unlock_without_lock_fails() {
        let mut lock = SessionLock::new();
        assert_eq!(lock.unlock(client(1)), Err(Status::NotLocked));
    }

    #[test]
    fn test_unlock_by_other_client_fails() {
        let mut lock = SessionLock::new();
        lock.lock(client(1)).unwrap();
        assert_eq!(lock.unlock(client(2)), Err(Status::WrongSession));
        assert!(lock.is_held_by(client(1)));
        assert_eq!(lock.unlock(client(1)), Ok(()));
        assert_eq!(lock.holder(), None);
    }

    #[test]
    fn test_release_for() {
        let mut lock = SessionLock::new();
        lock.lock(client(1)).unwrap();
        assert!(!lock.release_for(client(2)));
        assert!(lock.release_for(client(1)));
        assert_eq!(lock.lock(client(2)), Ok(()));
    }
}
