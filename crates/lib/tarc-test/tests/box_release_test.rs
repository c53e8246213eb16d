use tarc_runtime::Config;
use tarc_test::*;
use wasm_bindgen_test::*;

// Every array object created by the script has to be released again once all
// of its names are gone, no matter how often the script runs.

#[wasm_bindgen_test(unsupported = test)]
fn box_release_test() {
    let res = run_file_test("box_release.tarc").unwrap();
    let ans = vec![
        "{{[1], [2, 3]}, 0}",
        "2",
        "1",
        "{{[5], 6}, {[5], 6}, {[5], 6}}",
        "1",
        "{{[1], [2, 3]}, 0}",
    ];
    assert_eq!(res, ans);
}

#[wasm_bindgen_test(unsupported = test)]
fn box_release_repeated() {
    let (file, src) = load_src("box_release.tarc");
    let runs = (0..3)
        .map(|_| run_source_test(&src, Some(file.clone()), Config::default()).unwrap())
        .collect::<Vec<_>>();
    for (i, (lines, summary)) in runs.iter().enumerate() {
        println!("Run {i}: {} statements, {} leaked", summary.statements, summary.leaked);
        assert_eq!(summary.leaked, 0);
        assert_eq!(lines, &runs[0].0);
    }
}
