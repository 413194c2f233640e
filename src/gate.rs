//! # Compuerta de Cierre
//! src/gate.rs
//!
//! Evento que un test puede activar desde afuera para liberar un handler
//! que está reteniendo la conexión abierta a propósito. El teardown del
//! servidor también la activa al terminar el scope, sin importar cómo
//! terminó.
//!
//! Par `Mutex` + `Condvar`: el flag protegido por el mutex y la condvar
//! para despertar a quien espera.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Evento de un solo disparo, clonable entre threads
#[derive(Debug, Clone, Default)]
pub struct CloseGate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CloseGate {
    /// Crea una compuerta cerrada (sin activar)
    pub fn new() -> Self {
        Self::default()
    }

    /// Activa la compuerta y despierta a todos los que esperan
    pub fn set(&self) {
        let (lock, condvar) = &*self.inner;
        let mut is_set = lock.lock().unwrap_or_else(PoisonError::into_inner);
        *is_set = true;
        condvar.notify_all();
    }

    /// Indica si la compuerta ya fue activada
    pub fn is_set(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Espera a que la compuerta se active, como máximo `timeout`
    ///
    /// Retorna `true` si se activó, `false` si venció el tiempo.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, condvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut is_set = lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Las condvars pueden despertar sin notificación
        while !*is_set {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            is_set = condvar
                .wait_timeout(is_set, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }

        true
    }
}
