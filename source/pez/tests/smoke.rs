use std::{fs, path::PathBuf};

use pez::{config::Params, Error, Permissions, Pez, Status};

fn trace_init() {
    use tracing_subscriber::filter::LevelFilter;
    let _res = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .with_test_writer()
        .without_time()
        .try_init();
}

fn pez(permissions: Permissions) -> Pez<()> {
    trace_init();
    Pez::new(&Params::default(), permissions, ()).unwrap()
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pez-{name}-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn arithmetic_and_definitions() {
    let mut pez = pez(Permissions::empty());
    pez.eval("3 4 + .").unwrap();
    assert_eq!(pez.output.as_str(), "7 ");
    pez.output.clear();

    pez.eval(": DOUBLE DUP + ; 5 DOUBLE .").unwrap();
    assert_eq!(pez.output.as_str(), "10 ");
    assert!(pez.lookup("double").is_some());
}

#[test]
fn stack_law_and_underflow_codes() {
    let mut pez = pez(Permissions::empty());
    pez.push(11).unwrap();
    pez.push(22).unwrap();
    assert_eq!(pez.pop(), Ok(22));
    assert_eq!(pez.pop(), Ok(11));

    assert_eq!(pez.eval_status("drop"), Status::StackUnder);
    assert_eq!(pez.eval_status("r>"), Status::RStackUnder);
    assert_eq!(pez.eval_status("f."), Status::FStackUnder);
    assert_eq!(pez.eval_status("1 0 /"), Status::DivZero);
    assert_eq!(pez.eval_status("nope"), Status::Undefined);
    assert_eq!(pez.eval_status("1 ."), Status::Normal);
}

#[test]
fn mark_then_unwind_is_a_no_op() {
    let mut pez = pez(Permissions::empty());
    pez.eval("1 2 3 1.5 : kept ;").unwrap();
    let mark = pez.mark();
    pez.unwind(&mark);
    assert_eq!(pez.mark(), mark);
    assert_eq!(pez.data_stack.as_slice(), &[1, 2, 3]);
    assert_eq!(pez.float_stack.as_slice(), &[1.5]);
    assert!(pez.lookup("kept").is_some());
}

#[test]
fn unwind_hides_later_words() {
    let mut pez = pez(Permissions::empty());
    pez.eval("7").unwrap();
    let mark = pez.mark();
    let len = pez.dict_len();
    let here = pez.heap.here();

    pez.eval("drop 100 allot : later 1 ; variable v 1 2 3").unwrap();
    assert!(pez.lookup("later").is_some());
    pez.unwind(&mark);

    assert_eq!(pez.mark(), mark);
    assert!(pez.lookup("later").is_none());
    assert!(pez.lookup("v").is_none());
    assert_eq!(pez.dict_len(), len);
    assert_eq!(pez.heap.here(), here);
    assert_eq!(pez.data_stack.depth(), 1);
}

#[test]
fn each_region_overflows_with_its_own_status() {
    let mut pez = pez(Permissions::empty());
    pez.eval(": deep dup 0> if 1- recurse 0 drop then ;").unwrap();
    assert_eq!(pez.eval_status("100000 deep"), Status::RStackOver);

    let floats = "1.0 ".repeat(Params::default().float_stack_elems + 1);
    assert_eq!(pez.eval_status(&floats), Status::FStackOver);
    assert!(pez.float_stack.is_empty());

    assert_eq!(pez.eval_status("100000 allot"), Status::HeapOver);
    assert_eq!(pez.eval_status("2 3 + ."), Status::Normal);
    assert_eq!(pez.output.as_str(), "5 ");
}

#[test]
fn unwind_abandons_a_definition_in_progress() {
    let mut pez = pez(Permissions::empty());
    let mark = pez.mark();
    pez.eval(": half-done 1 2").unwrap();
    assert!(pez.is_compiling());
    pez.unwind(&mark);
    assert!(!pez.is_compiling());
    pez.eval("3 .").unwrap();
    assert_eq!(pez.output.as_str(), "3 ");
}

#[test]
fn protected_words_cannot_be_forgotten() {
    let mut pez = pez(Permissions::empty());
    pez.eval(": base-word 1 ;").unwrap();
    pez.protect();
    pez.eval(": user-word 2 ;").unwrap();

    assert_eq!(pez.eval("forget base-word"), Err(Error::ForgetProtected));
    assert_eq!(pez.eval_status("forget +"), Status::ForgetProt);
    pez.eval("forget user-word").unwrap();
    assert!(pez.lookup("user-word").is_none());
    assert!(pez.lookup("base-word").is_some());
}

#[test]
fn rejected_primitives_have_no_effect() {
    let dir = scratch_dir("perm");
    let victim = dir.join("victim.txt");
    fs::write(&victim, "keep me").unwrap();

    let mut pez = pez(Permissions::IO);
    let line = format!("\"{}\" unlink", victim.display());
    assert_eq!(pez.eval(&line), Err(Error::Permission(Permissions::FILES)));
    assert_eq!(fs::read_to_string(&victim).unwrap(), "keep me");
    assert_eq!(pez.eval_status("\"true\" system"), Status::Permission);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn strings_continue_on_the_next_line() {
    let mut pez = pez(Permissions::empty());
    assert_eq!(pez.eval("s\" abc"), Err(Error::RunString));
    assert!(pez.anticipating_token());
    pez.eval("xyz\" swap drop .").unwrap();
    assert_eq!(pez.output.as_str(), "7 ");

    pez.output.clear();
    pez.eval(".\" Mixed Case\\t\\\"quoted\\\"\"").unwrap();
    assert_eq!(pez.output.as_str(), "Mixed Case\t\"quoted\"");
}

#[test]
fn modules_load_once() {
    let dir = scratch_dir("modules");
    fs::write(
        dir.join("square.pez"),
        "( squares )\n: square dup * ;\n: cube\n  dup square * ;\n",
    )
    .unwrap();

    let mut pez = pez(Permissions::FILES);
    pez.add_load_path(&dir);
    assert_eq!(pez.which_lib("square"), Some(dir.join("square.pez")));

    pez.load_module("square").unwrap();
    let len = pez.dict_len();
    pez.load_module("square").unwrap();
    pez.load_module("square.pez").unwrap();
    pez.eval("\"square\" load").unwrap();
    assert_eq!(pez.dict_len(), len);

    pez.eval("3 cube .").unwrap();
    assert_eq!(pez.output.as_str(), "27 ");

    fs::write(dir.join("broken.pez"), ": ok 1 ;\n\n2 nope\n").unwrap();
    assert_eq!(
        pez.load_module("broken"),
        Err(Error::Undefined("nope".into()))
    );
    assert_eq!(pez.errline(), 3);
    assert_eq!(pez.load_module("missing"), Err(Error::BadFile));

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn break_interrupts_a_running_word() {
    let mut pez = pez(Permissions::empty());
    pez.eval(": spin begin again ;").unwrap();
    let handle = pez.break_handle();
    let waker = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(20));
        handle.request();
    });
    assert_eq!(pez.eval_status("spin"), Status::Break);
    waker.join().unwrap();
    pez.eval("5 .").unwrap();
    assert_eq!(pez.output.as_str(), "5 ");
}

#[test]
fn config_from_toml() {
    let params = Params::from_toml("stack_elems = 2\nwalkback = false\n").unwrap();
    let mut pez = Pez::new(&params, Permissions::empty(), ()).unwrap();
    assert_eq!(pez.eval_status("1 2 3"), Status::StackOver);
    assert_eq!(pez.memstat().stack.capacity, 2);
}
