//! Ordered update/render step registry
//!
//! Steps are registered through the controller and identified by a
//! [`StepToken`]. The registry never hands out its lists; a tick takes a
//! [`StepSnapshot`] (cheap `Rc` clones) and executes that, so steps that add or
//! remove steps while running only affect later ticks.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

type UpdateStep = Rc<RefCell<dyn FnMut(f64)>>;
type RenderStep = Rc<RefCell<dyn FnMut()>>;

/// Identifies one registration of a step
///
/// Registering the same behaviour twice yields two tokens and two executions
/// per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepToken(u64);

impl fmt::Display for StepToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step#{}", self.0)
    }
}

struct StepList<T: ?Sized> {
    entries: Vec<(StepToken, Rc<RefCell<T>>)>,
}

impl<T: ?Sized> Default for StepList<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: ?Sized> StepList<T> {
    fn push(&mut self, token: StepToken, step: Rc<RefCell<T>>) {
        self.entries.push((token, step));
    }

    fn remove(&mut self, token: StepToken) -> bool {
        match self.entries.iter().position(|(t, _)| *t == token) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    fn snapshot(&self) -> Vec<Rc<RefCell<T>>> {
        self.entries.iter().map(|(_, step)| Rc::clone(step)).collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Default)]
pub(crate) struct StepRegistry {
    next_token: u64,
    update: StepList<dyn FnMut(f64)>,
    render: StepList<dyn FnMut()>,
}

impl StepRegistry {
    fn issue_token(&mut self) -> StepToken {
        self.next_token += 1;
        StepToken(self.next_token)
    }

    pub(crate) fn add_update(&mut self, step: impl FnMut(f64) + 'static) -> StepToken {
        let token = self.issue_token();
        let step: UpdateStep = Rc::new(RefCell::new(step));
        self.update.push(token, step);
        token
    }

    pub(crate) fn add_render(&mut self, step: impl FnMut() + 'static) -> StepToken {
        let token = self.issue_token();
        let step: RenderStep = Rc::new(RefCell::new(step));
        self.render.push(token, step);
        token
    }

    pub(crate) fn remove_update(&mut self, token: StepToken) -> bool {
        self.update.remove(token)
    }

    pub(crate) fn remove_render(&mut self, token: StepToken) -> bool {
        self.render.remove(token)
    }

    pub(crate) fn update_len(&self) -> usize {
        self.update.len()
    }

    pub(crate) fn render_len(&self) -> usize {
        self.render.len()
    }

    pub(crate) fn clear(&mut self) {
        self.update = StepList::default();
        self.render = StepList::default();
    }

    pub(crate) fn snapshot(&self) -> StepSnapshot {
        StepSnapshot {
            update: self.update.snapshot(),
            render: self.render.snapshot(),
        }
    }
}

/// Frozen view of both phases, taken at tick start
pub(crate) struct StepSnapshot {
    update: Vec<UpdateStep>,
    render: Vec<RenderStep>,
}

impl StepSnapshot {
    /// Runs every update step with `elapsed_ms`, then every render step.
    pub(crate) fn run(&self, elapsed_ms: f64) {
        for step in &self.update {
            let mut step = step.borrow_mut();
            (*step)(elapsed_ms);
        }
        for step in &self.render {
            let mut step = step.borrow_mut();
            (*step)();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, Rc<RefCell<Vec<String>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        (log.clone(), log)
    }

    #[test]
    fn update_phase_runs_before_render_phase_in_registration_order() {
        let (log, sink) = recorder();
        let mut registry = StepRegistry::default();

        let s = sink.clone();
        registry.add_render(move || s.borrow_mut().push("R1".into()));
        let s = sink.clone();
        registry.add_update(move |dt| s.borrow_mut().push(format!("A{}", dt)));
        let s = sink.clone();
        registry.add_update(move |dt| s.borrow_mut().push(format!("B{}", dt)));
        let s = sink;
        registry.add_render(move || s.borrow_mut().push("R2".into()));

        registry.snapshot().run(16.0);
        assert_eq!(*log.borrow(), vec!["A16", "B16", "R1", "R2"]);
    }

    #[test]
    fn remove_by_token_only_touches_that_registration() {
        let mut registry = StepRegistry::default();
        let first = registry.add_update(|_| {});
        let second = registry.add_update(|_| {});
        let render = registry.add_render(|| {});

        assert_ne!(first, second);
        assert!(registry.remove_update(first));
        assert!(!registry.remove_update(first));
        assert!(!registry.remove_update(render));
        assert_eq!(registry.update_len(), 1);
        assert_eq!(registry.render_len(), 1);

        registry.clear();
        assert_eq!(registry.update_len() + registry.render_len(), 0);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_removal() {
        let (log, sink) = recorder();
        let mut registry = StepRegistry::default();
        let token = registry.add_update(move |_| sink.borrow_mut().push("U".into()));

        let snapshot = registry.snapshot();
        registry.remove_update(token);
        snapshot.run(1.0);
        registry.snapshot().run(1.0);

        assert_eq!(*log.borrow(), vec!["U"]);
    }
}
