//! Tree growth demo utility
//!
//! Builds a branch skeleton from a seed, scatters sprouts, runs the batched
//! transform and wind passes over a skeleton-dump buffer, and prints stats.
//!
//! Usage:
//!     grow_tree [OPTIONS]
//!
//! Options:
//!     --seed <SEED>           Base seed for RNG (default: 12345)
//!     --levels <N>            Branching depth below the trunk (default: 3)
//!     --children <N>          Children attached per branch (default: 3)
//!     --sprouts <N>           Sprout frequency per leaf branch (default: 12)
//!     --amplitude <F>         Wind amplitude (default: 0.6)
//!     -h, --help              Show this help message

use std::env;
use std::time::Instant;

use glam::{Quat, Vec3};

use sylva::core::Rng;
use sylva::curve::Curve;
use sylva::distribution::{AlignParams, DistributionMode, DistributionParams};
use sylva::math::IntRange;
use sylva::transform::{CurveTransformEngine, VertexBuffer, WindEncodingPass, WindUnit};
use sylva::tree::{Branch, BranchCurveModel, BranchId};

fn print_help() {
    eprintln!("grow_tree - tree growth demo utility");
    eprintln!();
    eprintln!("Usage: grow_tree [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("    --seed <SEED>           Base seed for RNG (default: 12345)");
    eprintln!("    --levels <N>            Branching depth below the trunk (default: 3)");
    eprintln!("    --children <N>          Children attached per branch (default: 3)");
    eprintln!("    --sprouts <N>           Sprout frequency per leaf branch (default: 12)");
    eprintln!("    --amplitude <F>         Wind amplitude (default: 0.6)");
    eprintln!("    -h, --help              Show this help message");
}

#[derive(Debug)]
struct Args {
    seed: u64,
    levels: u32,
    children: u32,
    sprouts: i32,
    amplitude: f32,
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = env::args().skip(1).collect();

    let mut seed: u64 = 12345;
    let mut levels: u32 = 3;
    let mut children: u32 = 3;
    let mut sprouts: i32 = 12;
    let mut amplitude: f32 = 0.6;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "--seed" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --seed".to_string());
                }
                seed = args[i].parse().map_err(|_| format!("Invalid seed: {}", args[i]))?;
            }
            "--levels" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --levels".to_string());
                }
                levels = args[i].parse().map_err(|_| format!("Invalid levels: {}", args[i]))?;
            }
            "--children" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --children".to_string());
                }
                children = args[i].parse().map_err(|_| format!("Invalid children: {}", args[i]))?;
            }
            "--sprouts" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --sprouts".to_string());
                }
                sprouts = args[i].parse().map_err(|_| format!("Invalid sprouts: {}", args[i]))?;
            }
            "--amplitude" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --amplitude".to_string());
                }
                amplitude = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid amplitude: {}", args[i]))?;
            }
            arg => {
                return Err(format!("Unknown option: {}", arg));
            }
        }
        i += 1;
    }

    Ok(Args {
        seed,
        levels,
        children,
        sprouts,
        amplitude,
    })
}

/// Grow a branch with a curved lean away from its parent direction
fn grown_branch(rng: &mut Rng, length: f32) -> Branch {
    let lean = Vec3::new(rng.range(-0.6, 0.6), 1.0, rng.range(-0.6, 0.6)).normalize();
    let tip = lean * length;
    let mid_bow = Vec3::new(rng.range(-0.2, 0.2), 0.0, rng.range(-0.2, 0.2)) * length;
    let mut curve = Curve::new();
    curve.add_node(sylva::curve::CurveNode::with_handles(
        Vec3::ZERO,
        Vec3::ZERO,
        tip / 3.0 + mid_bow,
    ));
    curve.add_node(sylva::curve::CurveNode::with_handles(
        tip,
        -tip / 3.0 + mid_bow,
        Vec3::ZERO,
    ));
    curve.resample();
    Branch::new(curve).with_girth(0.01, 0.08 * length / 4.0)
}

/// Build a branching skeleton by attaching children level by level
fn build_model(args: &Args) -> BranchCurveModel {
    let mut rng = Rng::new(args.seed);
    let mut model = BranchCurveModel::new();

    let trunk = model.add_root(
        Branch::new(Curve::line(Vec3::ZERO, Vec3::new(0.0, 6.0, 0.0))).with_girth(0.05, 0.3),
    );

    let mut frontier = vec![trunk];
    let mut length = 4.0;
    for _ in 0..args.levels {
        let mut next = Vec::new();
        for parent in frontier {
            for c in 0..args.children {
                let position = if c == 0 { 1.0 } else { rng.range(0.4, 0.95) };
                let child = model.add_branch(
                    parent,
                    grown_branch(&mut rng, length).with_position(position),
                );
                next.push(child);
            }
        }
        frontier = next;
        length *= 0.6;
    }

    model.rebuild(args.seed);

    // Sprouts on the leaf branches
    let params = DistributionParams {
        frequency: IntRange::new(args.sprouts / 2, args.sprouts),
        mode: DistributionMode::Whorled(3),
        spacing_variance: 0.3,
        angle_variance: 0.2,
        ..Default::default()
    };
    let align = AlignParams::default();
    let leaves: Vec<BranchId> = model
        .roots()
        .to_vec()
        .into_iter()
        .flat_map(|r| model.descendant_branches(r))
        .filter(|&id| model.branch(id).children().is_empty())
        .collect();
    for leaf in leaves {
        model.scatter_sprouts(leaf, &params, &align, &mut rng);
    }
    model.recalculate_sprouts(args.seed);
    model
}

fn main() {
    sylva::core::logging::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("Error: {}", message);
            eprintln!();
            print_help();
            std::process::exit(1);
        }
    };

    log::info!("Growing tree with seed {}", args.seed);
    let start = Instant::now();
    let mut model = build_model(&args);

    let branch_ids: Vec<BranchId> = model
        .roots()
        .to_vec()
        .into_iter()
        .flat_map(|r| {
            let mut ids = vec![r];
            ids.extend(model.descendant_branches(r));
            ids
        })
        .collect();
    let sprout_count: usize = branch_ids
        .iter()
        .map(|&id| model.branch(id).sprouts.len())
        .sum();

    // Skeleton dump: one surface vertex per cached curve sample, with the
    // curve registered behind it so both transform together.
    let mut buffer = VertexBuffer::new();
    let mut engine = CurveTransformEngine::new(Vec3::NEG_Y);
    let sway = Quat::from_rotation_z(0.04);
    let mut ranges = Vec::with_capacity(branch_ids.len());
    for (group, &id) in branch_ids.iter().enumerate() {
        let mesh_start = buffer.len();
        let origin = model.branch(id).origin();
        let samples: Vec<_> = model.branch(id).curve.samples().to_vec();
        for sample in &samples {
            let index = buffer.push(
                origin + sample.position + sample.normal * sample.girth,
                sample.normal,
            );
            buffer.set_weight(index, glam::Vec2::splat(sample.relative_position));
        }
        let handle = engine
            .add_branch_batch(
                &mut buffer,
                &model,
                id,
                mesh_start,
                Vec3::ZERO,
                Vec3::ZERO,
                Vec3::ONE,
                sway,
                false,
            )
            .expect("contiguous registration");
        engine.set_bend(handle, 0.4, 0.1);
        engine.set_id(handle, group as f32, 0.0);
        ranges.push((id, mesh_start, buffer.len() - mesh_start));
    }

    engine
        .execute(&mut buffer, &mut model)
        .expect("transform should succeed");

    let mut wind = WindEncodingPass::new(args.amplitude);
    for &(id, start, length) in &ranges {
        let b = model.branch(id);
        wind.add_unit(
            WindUnit {
                origin: b.origin(),
                swing_phase: glam::Vec2::new(b.phase().sin(), b.phase().cos()),
                phase: b.phase(),
            },
            start,
            length,
        );
    }
    wind.execute(&mut buffer).expect("wind encoding should succeed");

    let packed = buffer.pack();
    let bytes: &[u8] = bytemuck::cast_slice(&packed);

    log::info!(
        "Grew {} branches, {} sprouts, {} vertices ({} packed bytes) in {:.1}ms",
        branch_ids.len(),
        sprout_count,
        buffer.len(),
        bytes.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    println!("branches:  {}", branch_ids.len());
    println!("sprouts:   {}", sprout_count);
    println!("vertices:  {}", buffer.len());
    println!("packed:    {} bytes", bytes.len());
    println!("levels:    {}", model.total_levels());
}
