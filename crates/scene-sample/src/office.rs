//! An office: one company scene, department scenes nested inside it.
//!
//! The same employees belong to the company and to their department. Whichever scene is
//! active decides who counts as a colleague, so an OKR handed to a manager cascades to
//! the department when the department is active and to everyone when only the company is.

use actor_scene::{
    kind, message, Actor, ActorCore, ActorRef, Delivery, HandlerSet, HandlerTable, Kind, Message,
    MessageKind, Result, Scene,
};
use once_cell::sync::Lazy;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

message! {
    /// Objectives and key results, handed to whoever leads the effort.
    pub struct Okr {
        pub objective: String,
        #[serde(default)]
        pub key_results: Vec<String>,
    }
}

message! {
    /// What a lead passes on to colleagues.
    pub struct Direction {
        pub objective: String,
    }
}

pub struct Employee {
    core: ActorCore,
    name: String,
    directions: AtomicUsize,
}

kind!(Employee);

static EMPLOYEE: Lazy<Arc<HandlerTable>> = Lazy::new(|| {
    HandlerSet::<Employee>::new()
        .on(Employee::receive_okr)
        .on(|employee: &Employee, _: Delivery<'_, Direction>| {
            employee.directions.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .build()
});

impl Employee {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            core: ActorCore::new::<Self>(EMPLOYEE.clone()),
            name: name.into(),
            directions: AtomicUsize::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directions this employee has received.
    pub fn directions(&self) -> usize {
        self.directions.load(Ordering::Relaxed)
    }

    /// Turns an OKR into one direction per colleague in the current scene.
    fn receive_okr(&self, okr: Delivery<'_, Okr>) -> Result<Vec<Message>> {
        let colleagues = self.receivers(okr.scope, &[MessageKind::of::<Direction>()])?;
        info!(lead = %self.name, objective = %okr.objective, colleagues = colleagues.len(), "Cascading OKR");
        colleagues
            .into_iter()
            .map(|colleague| okr.forward::<Direction>(colleague))
            .collect()
    }
}

impl Actor for Employee {
    fn core(&self) -> &ActorCore {
        &self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct Company;
pub struct Department;

kind!(Company, Department);

/// A scene of kind `K` in which every employee is connected to every other.
fn staffed<K: Kind>(employees: &[Arc<Employee>]) -> Arc<Scene> {
    let scene = Scene::builder()
        .kind::<K>()
        .members(employees.iter().map(|employee| employee.clone() as ActorRef))
        .build();
    scene.connect_all();
    scene
}

impl Company {
    pub fn staff(employees: &[Arc<Employee>]) -> Arc<Scene> {
        staffed::<Company>(employees)
    }
}

impl Department {
    pub fn staff(employees: &[Arc<Employee>]) -> Arc<Scene> {
        staffed::<Department>(employees)
    }

    /// The subset of `employees` whose names are listed.
    pub fn of(employees: &[Arc<Employee>], names: &[&str]) -> Arc<Scene> {
        let members: Vec<_> = employees
            .iter()
            .filter(|employee| names.iter().any(|name| *name == employee.name()))
            .cloned()
            .collect();
        Self::staff(&members)
    }
}
