mod assembly;
mod linear_solver;
mod mesh;
