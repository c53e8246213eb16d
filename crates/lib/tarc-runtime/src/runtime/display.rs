use std::collections::HashSet;

use itertools::Itertools;

use super::heap::{ArrayHeap, Elements};
use crate::value::{ArrayRef, Value};

enum Step {
    Value(Value),
    Text(&'static str),
    Leave(ArrayRef),
}

impl ArrayHeap {
    /// Render a value with its nested arrays, e.g. `{[1, 2], 3}`.
    ///
    /// Flat arrays print in brackets, boxed arrays in braces. An array that
    /// already appears on the path from the outermost value prints as
    /// `<cycle>`, and a freed one as `<freed>`. Nesting depth is bounded by
    /// memory only.
    pub fn render(&self, v: Value) -> String {
        let mut out = String::new();
        let mut on_path = HashSet::new();
        let mut steps = vec![Step::Value(v)];
        while let Some(step) = steps.pop() {
            let r = match step {
                Step::Text(s) => {
                    out.push_str(s);
                    continue;
                }
                Step::Leave(r) => {
                    on_path.remove(&r);
                    out.push('}');
                    continue;
                }
                Step::Value(Value::Int(i)) => {
                    out.push_str(&i.to_string());
                    continue;
                }
                Step::Value(Value::Array(r)) => r,
            };
            if on_path.contains(&r) {
                out.push_str("<cycle>");
                continue;
            }
            match self.storage.get(r).map(|obj| &obj.elements) {
                None => out.push_str("<freed>"),
                Some(Elements::Flat(ints)) => {
                    out.push('[');
                    out.push_str(&ints.iter().join(", "));
                    out.push(']');
                }
                Some(Elements::Boxed(values)) => {
                    out.push('{');
                    on_path.insert(r);
                    steps.push(Step::Leave(r));
                    for (i, e) in values.iter().enumerate().rev() {
                        steps.push(Step::Value(*e));
                        if i > 0 {
                            steps.push(Step::Text(", "));
                        }
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_nested() {
        let mut heap = ArrayHeap::new();
        let a = heap.make_from_ints(vec![1, 2]);
        let b = heap
            .make_boxed_from(vec![Value::Array(a), Value::Int(3)])
            .unwrap();
        assert_eq!(heap.render(Value::Array(b)), "{[1, 2], 3}");
        assert_eq!(heap.render(Value::Int(-5)), "-5");
    }

    #[test]
    fn render_cycle() {
        let mut heap = ArrayHeap::new();
        let a = heap.make_boxed(2, Value::Int(0)).unwrap();
        heap.set(Value::Array(a), 0, Value::Array(a)).unwrap();
        assert_eq!(heap.render(Value::Array(a)), "{<cycle>, 0}");
    }

    #[test]
    fn render_deep_chain() {
        let mut heap = ArrayHeap::new();
        let depth = 100_000;
        let mut v = Value::Int(0);
        for _ in 0..depth {
            v = Value::Array(heap.make_boxed_from(vec![v]).unwrap());
        }
        let s = heap.render(v);
        assert_eq!(s.len(), 2 * depth + 1);
        assert!(s.starts_with("{{{"));
        assert!(s.ends_with("0}}}"));
    }

    #[test]
    fn render_shared_is_not_a_cycle() {
        let mut heap = ArrayHeap::new();
        let a = heap.make_from_ints(vec![7]);
        let b = heap
            .make_boxed_from(vec![Value::Array(a), Value::Array(a)])
            .unwrap();
        let c = heap.make_boxed_from(vec![Value::Array(b), Value::Array(b)]).unwrap();
        assert_eq!(
            heap.render(Value::Array(c)),
            "{{[7], [7]}, {[7], [7]}}"
        );
    }
}
