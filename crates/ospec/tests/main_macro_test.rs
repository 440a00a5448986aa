//! Runs as a plain binary (`harness = false`): `#[ospec::main]` supplies
//! `main` and the exit code is the failure count.

use ospec::{Completion, ErrorSpec, Exception, Ospec, Value};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

#[ospec::main]
fn suite(o: &Ospec) {
    o.spec("main macro", |o| {
        let resets = Rc::new(Cell::new(0));
        let counter = resets.clone();
        o.before_each(move |_| counter.set(counter.get() + 1));

        o.test("sync assertions", |cx| {
            cx.o(2 + 2).equals(4);
            cx.o("a").not_equals("b");
            cx.o(Value::object([("k", vec![1, 2])]))
                .deep_equals(Value::object([("k", vec![1, 2])]));
        });

        o.test("throws", |cx| {
            let parse = Value::native(|_| Err(Exception::new("SyntaxError", "bad token").into()));
            cx.o(&parse).throws("bad token");
            cx.o(&parse).throws(ErrorSpec::of::<Exception>());
            cx.o(Value::func(|| ())).not_throws("bad token");
        });

        o.test("future completion", |cx| {
            Completion::future(async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                cx.o(true).equals(true);
            })
        })
        .timeout(1_000);

        o.test("spies", |cx| {
            let double = ospec::spy_on(|n: i32| n * 2);
            cx.o(double.call(21)).equals(42);
            cx.o(double.call_count()).equals(1);
        });

        o.after(move |cx| {
            cx.o(resets.get()).equals(4);
        });
    });
}
