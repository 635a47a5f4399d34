//! Warten auf ICE-Konnektivitaet
//!
//! Ereignisgetrieben ueber den `watch`-Kanal der Peer-Connection, kein
//! Polling. Endet mit Fehler, sobald ein terminaler Zustand erreicht wird.

use tokio::sync::watch;

use crate::error::{RtcError, RtcResult};
use crate::platform::IceConnectionState;

/// Wartet, bis der ICE-Zustand `connected` oder `completed` erreicht
///
/// `failed`/`closed` oder ein geschlossener Kanal fuehren zu
/// [`RtcError::IceNeverConnected`]. `disconnected` wird abgewartet.
pub async fn wait_for_connected(mut state: watch::Receiver<IceConnectionState>) -> RtcResult<()> {
    loop {
        let aktuell = *state.borrow_and_update();
        if aktuell.is_connected() {
            return Ok(());
        }
        if aktuell.is_terminal() {
            return Err(RtcError::IceNeverConnected { state: aktuell });
        }

        if state.changed().await.is_err() {
            let letzter = *state.borrow();
            return if letzter.is_connected() {
                Ok(())
            } else {
                Err(RtcError::IceNeverConnected { state: letzter })
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bereits_verbunden() {
        let (_tx, rx) = watch::channel(IceConnectionState::Completed);
        assert!(wait_for_connected(rx).await.is_ok());
    }

    #[tokio::test]
    async fn wartet_auf_connected() {
        let (tx, rx) = watch::channel(IceConnectionState::New);
        let warten = tokio::spawn(wait_for_connected(rx));

        tx.send(IceConnectionState::Checking).unwrap();
        tokio::task::yield_now().await;
        tx.send(IceConnectionState::Connected).unwrap();

        assert!(warten.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn failed_bricht_ab() {
        let (tx, rx) = watch::channel(IceConnectionState::New);
        let warten = tokio::spawn(wait_for_connected(rx));

        tx.send(IceConnectionState::Checking).unwrap();
        tokio::task::yield_now().await;
        tx.send(IceConnectionState::Failed).unwrap();

        assert!(matches!(
            warten.await.unwrap(),
            Err(RtcError::IceNeverConnected {
                state: IceConnectionState::Failed
            })
        ));
    }

    #[tokio::test]
    async fn disconnected_ist_nicht_terminal() {
        let (tx, rx) = watch::channel(IceConnectionState::Disconnected);
        let warten = tokio::spawn(wait_for_connected(rx));
        tokio::task::yield_now().await;
        tx.send(IceConnectionState::Connected).unwrap();
        assert!(warten.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn geschlossener_kanal() {
        let (tx, rx) = watch::channel(IceConnectionState::Checking);
        drop(tx);
        assert!(matches!(
            wait_for_connected(rx).await,
            Err(RtcError::IceNeverConnected {
                state: IceConnectionState::Checking
            })
        ));
    }
}
