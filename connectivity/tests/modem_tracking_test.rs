//! Tests for modem tracking against a scripted bus.
//!
//! The bus is replaced by an in-memory fake, so no D-Bus daemon is needed.

use async_trait::async_trait;
use connectivity::{
    ModemBus, ModemChange, ModemEvent, ModemManager, ObjectHandle, PropertyBag, registration,
};
use futures::channel::mpsc;
use futures::stream::{BoxStream, StreamExt};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use zvariant::{OwnedValue, Value};

struct ScriptedBus {
    initial: Vec<ObjectHandle>,
    events: Mutex<Option<mpsc::UnboundedReceiver<ModemEvent>>>,
}

#[async_trait]
impl ModemBus for ScriptedBus {
    async fn get_modems(
        &self,
    ) -> connectivity::Result<Vec<(ObjectHandle, HashMap<String, String>)>> {
        Ok(self
            .initial
            .iter()
            .map(|handle| (handle.clone(), HashMap::new()))
            .collect())
    }

    async fn get_properties(&self, modem: &ObjectHandle) -> connectivity::Result<PropertyBag> {
        let mut values = HashMap::new();
        values.insert(
            "Name".to_string(),
            Value::from(format!("operator{}", modem.as_str()))
                .try_into()
                .unwrap(),
        );
        values.insert("CellId".to_string(), OwnedValue::from(4242u32));
        Ok(PropertyBag::new(values))
    }

    async fn modem_events(&self) -> connectivity::Result<BoxStream<'static, ModemEvent>> {
        let rx = self.events.lock().unwrap().take().unwrap();
        Ok(rx.boxed())
    }
}

fn handle(path: &str) -> ObjectHandle {
    ObjectHandle::try_from(path).unwrap()
}

async fn manager(initial: &[&str]) -> (ModemManager, mpsc::UnboundedSender<ModemEvent>) {
    let (tx, rx) = mpsc::unbounded();
    let bus = Arc::new(ScriptedBus {
        initial: initial.iter().map(|p| handle(p)).collect(),
        events: Mutex::new(Some(rx)),
    });
    (ModemManager::new(bus).await.unwrap(), tx)
}

fn paths(manager: &ModemManager) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    manager.for_each(|modem| {
        seen.insert(modem.handle().to_string());
    });
    seen
}

fn set(paths: &[&str]) -> BTreeSet<String> {
    paths.iter().map(|p| p.to_string()).collect()
}

#[tokio::test]
async fn test_add_then_remove_scenario() {
    let (manager, tx) = manager(&["/A", "/B"]).await;
    let mut changes = manager.changes();
    assert_eq!(paths(&manager), set(&["/A", "/B"]));

    tx.unbounded_send(ModemEvent::Added {
        handle: handle("/C"),
        hints: HashMap::new(),
    })
    .unwrap();
    assert_eq!(changes.recv().await.unwrap(), ModemChange::Added(handle("/C")));
    assert_eq!(paths(&manager), set(&["/A", "/B", "/C"]));

    tx.unbounded_send(ModemEvent::Removed(handle("/B"))).unwrap();
    assert_eq!(
        changes.recv().await.unwrap(),
        ModemChange::Removed(handle("/B"))
    );
    assert_eq!(paths(&manager), set(&["/A", "/C"]));
}

#[tokio::test]
async fn test_membership_is_added_minus_removed() {
    let (manager, tx) = manager(&[]).await;
    let mut changes = manager.changes();

    let script = [
        ModemEvent::Added {
            handle: handle("/ril_0"),
            hints: HashMap::new(),
        },
        ModemEvent::Added {
            handle: handle("/ril_1"),
            hints: HashMap::new(),
        },
        ModemEvent::Removed(handle("/ril_0")),
        ModemEvent::Added {
            handle: handle("/ril_2"),
            hints: HashMap::new(),
        },
        ModemEvent::Added {
            handle: handle("/ril_0"),
            hints: HashMap::new(),
        },
        ModemEvent::Removed(handle("/ril_1")),
    ];
    for event in script {
        tx.unbounded_send(event).unwrap();
    }
    for _ in 0..6 {
        changes.recv().await.unwrap();
    }

    assert_eq!(paths(&manager), set(&["/ril_0", "/ril_2"]));
    assert_eq!(manager.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_traversal_never_sees_torn_entries() {
    let (manager, tx) = manager(&[]).await;
    let manager = Arc::new(manager);

    let reader = {
        let manager = manager.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                manager.for_each(|modem| {
                    let reg = modem.network_registration();
                    assert_eq!(reg.get::<registration::CellId>(), 4242);
                    assert_eq!(
                        reg.get::<registration::Name>(),
                        format!("operator{}", modem.handle())
                    );
                });
                tokio::task::yield_now().await;
            }
        })
    };

    for i in 0..50 {
        let path = format!("/ril_{i}");
        tx.unbounded_send(ModemEvent::Added {
            handle: handle(&path),
            hints: HashMap::new(),
        })
        .unwrap();
        if i % 3 == 0 {
            tx.unbounded_send(ModemEvent::Removed(handle(&path))).unwrap();
        }
    }

    // Events are applied in order, so the barrier marks the end of the script.
    tx.unbounded_send(ModemEvent::Added {
        handle: handle("/barrier"),
        hints: HashMap::new(),
    })
    .unwrap();
    while !manager.contains(&handle("/barrier")) {
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    }
    reader.await.unwrap();

    assert_eq!(manager.len(), 50 - 17 + 1);
}

#[tokio::test]
async fn test_typed_reads_default_on_missing() {
    let (manager, _tx) = manager(&["/ril_0"]).await;

    manager.for_each(|modem| {
        let reg = modem.network_registration();
        assert_eq!(reg.get::<registration::Strength>(), 0);
        assert_eq!(reg.get_or::<registration::LocationAreaCode>(9), 9);
        assert_eq!(reg.get::<registration::Technology>(), "");
    });
}
