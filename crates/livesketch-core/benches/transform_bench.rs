use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use futures::executor::block_on;
use livesketch_core::parser::parse;
use livesketch_core::transforms::{transform_code, Capabilities, GuardOptions, TransformOptions};
use livesketch_core::{LiveSketch, SketchConfig};

const SKETCH: &str = r#"
    var balls = [];
    var Ball = function (x, y) {
        this.x = x;
        this.y = y;
        this.speed = random(1, 4);
    };
    Ball.prototype.move = function () {
        this.y += this.speed;
        if (this.y > height) {
            this.y = 0;
        }
    };
    for (var i = 0; i < 20; i++) {
        balls.push(new Ball(i * 20, 0));
    }
    var draw = function () {
        background(255, 255, 255);
        fill(200, 0, 0);
        for (var j = 0; j < balls.length; j++) {
            balls[j].move();
            ellipse(balls[j].x, balls[j].y, 10, 10);
        }
    };
"#;

fn capabilities() -> Capabilities {
    Capabilities::new(["random", "height", "background", "fill", "ellipse", "draw"])
}

fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_sketch", |b| {
        b.iter(|| {
            if let Ok(program) = parse(black_box(SKETCH)) {
                black_box(&program);
            }
        })
    });
}

fn bench_transform(c: &mut Criterion) {
    let capabilities = capabilities();
    let mut group = c.benchmark_group("transform_sketch");
    for (name, options) in [
        ("fresh_guarded", TransformOptions::fresh(GuardOptions::default())),
        ("fresh_unguarded", TransformOptions::fresh(GuardOptions::default()).without_loop_guard()),
        ("patch", TransformOptions::patch()),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &options, |b, options| {
            b.iter(|| black_box(transform_code(black_box(SKETCH), options, &capabilities)))
        });
    }
    group.finish();
}

fn bench_live_edit(c: &mut Criterion) {
    let edited = SKETCH.replace("fill(200, 0, 0)", "fill(0, 0, 200)");
    c.bench_function("live_edit_patch", |b| {
        let Ok(mut sketch) = LiveSketch::new(SketchConfig::default()) else {
            return;
        };
        block_on(sketch.run_code(SKETCH, |_| {}));
        let mut flip = false;
        b.iter(|| {
            let code = if flip { SKETCH } else { edited.as_str() };
            flip = !flip;
            block_on(sketch.run_code(black_box(code), |_| {}));
        })
    });
}

criterion_group!(benches, bench_parse, bench_transform, bench_live_edit);
criterion_main!(benches);
