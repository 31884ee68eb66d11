// cone-stipple: weighted Voronoi stippling on the GPU
//
// Lloyd relaxation of a point set towards the darkness of an image: cones
// rasterize the Voronoi diagram, a gather pass sums weighted positions per
// cell and row, and a compute pass moves every site to its centroid. The
// relaxed sites are exported as SVG circles sized by local darkness.
//
// Reference: Secord, "Weighted Voronoi Stippling" (NPAR 2002); Hoff et al.,
// "Fast Computation of Generalized Voronoi Diagrams Using Graphics
// Hardware" (SIGGRAPH 1999)

pub mod config;
pub mod id;
pub mod image;
pub mod weight;
pub mod site;
pub mod lloyd;
pub mod preview;
pub mod svg;
pub mod stipple;
pub mod cli;
pub mod window;

pub mod gpu;
